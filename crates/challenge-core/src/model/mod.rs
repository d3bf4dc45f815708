//! Domain types shared by the store, the handlers and the transport.

mod challenge;
mod progress;
mod rank;
mod reason;
mod reset;

pub use challenge::{
    Challenge, ChallengeDraft, ChallengeStatus, Membership, StartedChallenge, SECONDS_PER_DAY,
};
pub use progress::RecoveryProgress;
pub use rank::ChallengeRank;
pub use reason::StartReason;
pub use reset::{ResetInfo, ResetRecord};

pub type ChallengeId = i64;
pub type MemberId = i64;
pub type UserId = i64;
pub type ReasonId = i64;
pub type ResetRecordId = i64;
