//! # ChallengeTogether Core Library
//!
//! Domain core of the ChallengeTogether accountability app: the
//! started-challenge lifecycle and the reset/progress model. Every streak,
//! ranking and recovery figure is derived from one mutable timestamp per
//! participant, the most recent reset (or start) time.
//!
//! ## Architecture
//!
//! - **Record Store**: SQLite-backed owner of challenges, memberships, reset
//!   history and start reasons, with per-challenge mutation locks
//! - **Reset Handler**: validates and applies resets and continues
//! - **Streak Calculator**: pure functions of an anchor, a target and `now`
//! - **Reason Log**: ordered start reasons per participant
//! - **Ranking**: leaderboard recomputed at query time
//! - **Transport / Repository**: the endpoint boundary and the facade that
//!   adds timeouts, in-progress flags and subscriptions on top of it
//!
//! ## Key Components
//!
//! - [`ChallengeCore`]: the store and handlers wired together
//! - [`StartedChallengeRepository`]: what a presentation layer calls
//! - [`Transport`]: trait for the downstream collaborator
//! - [`Config`]: application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod model;
pub mod ranking;
pub mod reasons;
pub mod record_store;
pub mod repository;
pub mod reset_handler;
pub mod service;
pub mod storage;
pub mod streak;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use events::{ChallengeEvent, EventBus};
pub use model::{
    Challenge, ChallengeDraft, ChallengeId, ChallengeRank, ChallengeStatus, MemberId, Membership,
    ReasonId, RecoveryProgress, ResetInfo, ResetRecord, StartReason, StartedChallenge, UserId,
};
pub use ranking::RankingAggregator;
pub use reasons::{ReasonLog, ReasonPolicy};
pub use record_store::RecordStore;
pub use repository::{LoadFailure, LoadState, Operation, StartedChallengeRepository, Subscription};
pub use reset_handler::{ResetHandler, ResetPolicy};
pub use service::ChallengeCore;
pub use storage::{ChallengeDb, Config};
pub use streak::Streak;
pub use transport::{LocalTransport, NetworkResult, Transport, TransportError};
