use serde::{Deserialize, Serialize};

use super::{MemberId, UserId};

/// One row of a challenge leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRank {
    pub member_id: MemberId,
    pub user_id: UserId,
    /// 1-based position by current streak.
    pub rank: u32,
    pub current_streak_seconds: i64,
    pub reset_count: u32,
    /// Total logged seconds: every recorded streak plus the current one.
    pub score_seconds: i64,
    /// 1-based position by `score_seconds`.
    pub score_rank: u32,
}
