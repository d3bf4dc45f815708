use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{ChallengeId, MemberId, ResetRecordId};

/// An immutable entry in a participant's reset history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetRecord {
    pub reset_record_id: ResetRecordId,
    pub member_id: MemberId,
    pub reset_date_time: NaiveDateTime,
    /// Streak achieved before this reset.
    pub record_in_seconds: i64,
    pub content: String,
}

/// Reset history of one participant, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetInfo {
    pub challenge_id: ChallengeId,
    pub member_id: MemberId,
    pub start_date_time: NaiveDateTime,
    pub recent_reset_date_time: NaiveDateTime,
    /// Longest streak so far, the running one included.
    pub best_record_in_seconds: i64,
    pub records: Vec<ResetRecord>,
}

impl ResetInfo {
    pub fn reset_count(&self) -> usize {
        self.records.len()
    }
}
