use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{ChallengeId, MemberId, ReasonId};

/// A user-authored reason for taking on a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReason {
    pub reason_id: ReasonId,
    pub challenge_id: ChallengeId,
    pub member_id: MemberId,
    pub content: String,
    pub created_at: NaiveDateTime,
}
