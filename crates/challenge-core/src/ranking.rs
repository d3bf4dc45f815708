//! Leaderboard per challenge.
//!
//! Ranks are recomputed from each participant's streak anchor at query time.
//! Order is current streak descending, then member id ascending, so two
//! queries at the same `now` always agree.

use chrono::NaiveDateTime;
use std::cmp::Reverse;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::model::{ChallengeId, ChallengeRank, MemberId, Membership, UserId};
use crate::storage::{ChallengeDb, ResetStats};
use crate::streak::Streak;

/// What the ranking needs to know about one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub member_id: MemberId,
    pub user_id: UserId,
    /// None while the challenge is waiting.
    pub anchor: Option<NaiveDateTime>,
    pub stats: ResetStats,
}

impl Participant {
    pub fn from_membership(member: &Membership, stats: ResetStats) -> Self {
        Self {
            member_id: member.member_id,
            user_id: member.user_id,
            anchor: member.recent_reset_date_time,
            stats,
        }
    }

    fn streak_seconds(&self, now: NaiveDateTime) -> i64 {
        // Target does not affect elapsed time.
        self.anchor
            .map(|anchor| Streak::new(anchor, 0).current_seconds(now))
            .unwrap_or(0)
    }
}

/// Rank participants at `now`.
pub fn rank_participants(participants: &[Participant], now: NaiveDateTime) -> Vec<ChallengeRank> {
    let mut rows: Vec<ChallengeRank> = participants
        .iter()
        .map(|p| {
            let current = p.streak_seconds(now);
            ChallengeRank {
                member_id: p.member_id,
                user_id: p.user_id,
                rank: 0,
                current_streak_seconds: current,
                reset_count: p.stats.reset_count,
                score_seconds: p.stats.logged_seconds + current,
                score_rank: 0,
            }
        })
        .collect();

    rows.sort_by_key(|r| (Reverse(r.score_seconds), r.member_id));
    for (i, row) in rows.iter_mut().enumerate() {
        row.score_rank = position(i);
    }

    rows.sort_by_key(|r| (Reverse(r.current_streak_seconds), r.member_id));
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = position(i);
    }
    rows
}

fn position(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

/// Load a challenge's participants with their reset stats.
pub(crate) fn load_participants(db: &ChallengeDb, challenge_id: ChallengeId) -> Result<Vec<Participant>> {
    let stats = db.reset_stats(challenge_id)?;
    Ok(db
        .members(challenge_id)?
        .iter()
        .map(|m| {
            Participant::from_membership(m, stats.get(&m.member_id).copied().unwrap_or_default())
        })
        .collect())
}

pub struct RankingAggregator {
    db: Arc<ChallengeDb>,
    clock: Arc<dyn Clock>,
}

impl RankingAggregator {
    pub fn new(db: Arc<ChallengeDb>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Leaderboard of a challenge, best streak first.
    ///
    /// # Errors
    /// `NotFound` if the challenge does not exist.
    pub fn rank(&self, challenge_id: ChallengeId) -> Result<Vec<ChallengeRank>> {
        if self.db.challenge(challenge_id)?.is_none() {
            return Err(CoreError::not_found(format!("challenge {challenge_id}")));
        }
        let participants = load_participants(&self.db, challenge_id)?;
        let now = self.clock.now();
        tracing::debug!(challenge_id, participants = participants.len(), "ranking challenge");
        Ok(rank_participants(&participants, now))
    }
}
