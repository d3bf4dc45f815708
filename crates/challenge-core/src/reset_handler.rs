//! Reset and continue transactions.
//!
//! A reset records the streak that just ended and moves the anchor to the
//! reset moment. A continue restarts a completed challenge from `now`
//! without touching the history. Both run as read-validate-write under the
//! challenge lock, so nothing is applied when validation fails. The write
//! only lands if the anchor it was validated against is still current;
//! otherwise the operation re-reads and validates again.

use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::{format_datetime, Clock};
use crate::error::{check_len, CoreError, Result};
use crate::model::{ChallengeId, ChallengeStatus, ResetRecord, UserId};
use crate::record_store::{require_participation, require_started};
use crate::storage::{ChallengeDb, LimitsConfig};
use crate::streak::Streak;

/// Rounds of read-validate-write before a contended mutation gives up.
const MAX_ATTEMPTS: usize = 3;

/// Caller-supplied constraints on reset input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResetPolicy {
    /// Maximum memo length in characters. `None` accepts any length.
    pub memo_max_chars: Option<usize>,
}

impl From<&LimitsConfig> for ResetPolicy {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            memo_max_chars: Some(limits.memo_max_chars),
        }
    }
}

pub struct ResetHandler {
    db: Arc<ChallengeDb>,
    clock: Arc<dyn Clock>,
    policy: ResetPolicy,
}

impl ResetHandler {
    pub fn new(db: Arc<ChallengeDb>, clock: Arc<dyn Clock>, policy: ResetPolicy) -> Self {
        Self { db, clock, policy }
    }

    /// Record a relapse at `reset_date_time`.
    ///
    /// The new record holds the seconds between the previous anchor and
    /// `reset_date_time`; the anchor then moves to `reset_date_time`.
    ///
    /// # Errors
    /// - `NotFound` / `Forbidden` when the challenge or membership is missing
    /// - `Conflict` when the challenge is waiting or already completed
    /// - `InvalidTimestamp` when `reset_date_time` is before the anchor or
    ///   after now
    /// - `Validation` when the memo exceeds the policy limit
    /// - `Conflict` when other writers keep moving the anchor
    pub fn reset(
        &self,
        challenge_id: ChallengeId,
        caller: UserId,
        reset_date_time: NaiveDateTime,
        memo: &str,
    ) -> Result<ResetRecord> {
        check_len("memo", memo, self.policy.memo_max_chars)?;

        self.db.locks().with_lock(challenge_id, || {
            for attempt in 1..=MAX_ATTEMPTS {
                if let Some(record) = self.try_reset(challenge_id, caller, reset_date_time, memo)? {
                    return Ok(record);
                }
                debug!(challenge_id, caller, attempt, "anchor moved during reset, re-validating");
            }
            Err(contended(challenge_id))
        })
    }

    /// One read-validate-write round. `None` means the anchor moved.
    fn try_reset(
        &self,
        challenge_id: ChallengeId,
        caller: UserId,
        reset_date_time: NaiveDateTime,
        memo: &str,
    ) -> Result<Option<ResetRecord>> {
        let (challenge, member) = require_participation(&self.db, challenge_id, caller)?;
        let anchor = require_started(&challenge, &member)?;
        let now = self.clock.now();

        if reset_date_time < anchor {
            warn!(challenge_id, caller, "reset before the current anchor rejected");
            return Err(CoreError::invalid_timestamp(format!(
                "reset at {} is before the most recent start {}",
                format_datetime(&reset_date_time),
                format_datetime(&anchor)
            )));
        }
        if reset_date_time > now {
            warn!(challenge_id, caller, "reset in the future rejected");
            return Err(CoreError::invalid_timestamp(format!(
                "reset at {} is in the future",
                format_datetime(&reset_date_time)
            )));
        }

        let streak = Streak::new(anchor, challenge.target_days);
        if streak.status(now) == ChallengeStatus::Completed {
            return Err(CoreError::conflict(format!(
                "challenge {challenge_id} is completed; continue it before resetting"
            )));
        }

        let record_in_seconds = streak.current_seconds(reset_date_time);
        let record = self.db.append_reset(
            member.member_id,
            anchor,
            reset_date_time,
            record_in_seconds,
            memo,
        )?;
        if record.is_some() {
            info!(
                challenge_id,
                member_id = member.member_id,
                record_in_seconds,
                "reset applied"
            );
        }
        Ok(record)
    }

    /// Restart a completed challenge from now.
    ///
    /// Returns the new anchor.
    ///
    /// # Errors
    /// `NotFound` / `Forbidden` as for [`reset`](Self::reset); `Conflict` when
    /// the challenge is not currently completed.
    pub fn continue_started_challenge(
        &self,
        challenge_id: ChallengeId,
        caller: UserId,
    ) -> Result<NaiveDateTime> {
        self.db.locks().with_lock(challenge_id, || {
            for attempt in 1..=MAX_ATTEMPTS {
                let (challenge, member) = require_participation(&self.db, challenge_id, caller)?;
                let anchor = require_started(&challenge, &member)?;
                let now = self.clock.now();

                if Streak::new(anchor, challenge.target_days).status(now)
                    != ChallengeStatus::Completed
                {
                    return Err(CoreError::conflict(format!(
                        "challenge {challenge_id} is not completed"
                    )));
                }

                if self.db.move_anchor(member.member_id, anchor, now)? {
                    info!(challenge_id, member_id = member.member_id, at = %now, "challenge continued");
                    return Ok(now);
                }
                debug!(challenge_id, caller, attempt, "anchor moved during continue, re-validating");
            }
            Err(contended(challenge_id))
        })
    }
}

fn contended(challenge_id: ChallengeId) -> CoreError {
    CoreError::conflict(format!(
        "challenge {challenge_id} changed concurrently; try again"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::ChallengeDraft;
    use crate::record_store::RecordStore;
    use chrono::{Duration, NaiveDate};
    use proptest::prelude::*;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 4, 1)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap()
    }

    struct Fixture {
        store: RecordStore,
        resets: ResetHandler,
        clock: Arc<ManualClock>,
        challenge_id: ChallengeId,
    }

    fn fixture(target_days: u32) -> Fixture {
        let db = Arc::new(ChallengeDb::open_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0()));
        let store = RecordStore::new(db.clone(), clock.clone());
        let draft = ChallengeDraft {
            title: "No gaming".into(),
            description: String::new(),
            category: "GAME".into(),
            target_days,
            max_participant_count: 4,
            is_private: false,
        };
        let (challenge_id, _) = store.create_challenge(&draft, 1).unwrap();
        store.start(challenge_id, 1).unwrap();
        let resets = ResetHandler::new(
            db,
            clock.clone(),
            ResetPolicy {
                memo_max_chars: Some(20),
            },
        );
        Fixture {
            store,
            resets,
            clock,
            challenge_id,
        }
    }

    #[test]
    fn reset_after_five_days() {
        let f = fixture(30);
        f.clock.advance(Duration::days(6));

        let at = t0() + Duration::days(5);
        let record = f.resets.reset(f.challenge_id, 1, at, "slipped").unwrap();
        assert_eq!(record.record_in_seconds, 432_000);
        assert_eq!(record.content, "slipped");

        let detail = f.store.get(f.challenge_id, 1).unwrap();
        assert_eq!(detail.recent_reset_date_time, at);
        assert_eq!(f.store.reset_info(f.challenge_id, 1).unwrap().records, vec![record]);
    }

    #[test]
    fn reset_before_anchor_changes_nothing() {
        let f = fixture(30);
        f.clock.advance(Duration::days(2));
        let err = f
            .resets
            .reset(f.challenge_id, 1, t0() - Duration::seconds(1), "")
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTimestamp(_)));

        let info = f.store.reset_info(f.challenge_id, 1).unwrap();
        assert!(info.records.is_empty());
        assert_eq!(info.recent_reset_date_time, t0());
    }

    #[test]
    fn reset_in_future_is_rejected() {
        let f = fixture(30);
        let err = f
            .resets
            .reset(f.challenge_id, 1, t0() + Duration::minutes(1), "")
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTimestamp(_)));
    }

    #[test]
    fn reset_at_anchor_records_zero() {
        let f = fixture(30);
        let record = f.resets.reset(f.challenge_id, 1, t0(), "").unwrap();
        assert_eq!(record.record_in_seconds, 0);
        // A retry with the same timestamp appends another zero-length record.
        f.resets.reset(f.challenge_id, 1, t0(), "").unwrap();
        assert_eq!(f.store.reset_info(f.challenge_id, 1).unwrap().reset_count(), 2);
    }

    #[test]
    fn reset_membership_errors() {
        let f = fixture(30);
        assert!(matches!(
            f.resets.reset(f.challenge_id, 2, t0(), ""),
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            f.resets.reset(f.challenge_id + 1, 1, t0(), ""),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn memo_limit_is_enforced_before_anything_else() {
        let f = fixture(30);
        let long = "x".repeat(21);
        assert!(matches!(
            f.resets.reset(f.challenge_id, 1, t0(), &long),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn reset_on_waiting_challenge_is_conflict() {
        let f = fixture(30);
        let draft = ChallengeDraft {
            title: "Later".into(),
            description: String::new(),
            category: String::new(),
            target_days: 10,
            max_participant_count: 2,
            is_private: false,
        };
        let (waiting, _) = f.store.create_challenge(&draft, 1).unwrap();
        assert!(matches!(
            f.resets.reset(waiting, 1, t0(), ""),
            Err(CoreError::Conflict(_))
        ));
    }

    #[test]
    fn continue_requires_completion() {
        let f = fixture(10);
        f.clock.advance(Duration::days(3));
        assert!(matches!(
            f.resets.continue_started_challenge(f.challenge_id, 1),
            Err(CoreError::Conflict(_))
        ));
        assert_eq!(
            f.store.get(f.challenge_id, 1).unwrap().recent_reset_date_time,
            t0()
        );
    }

    #[test]
    fn continue_restarts_from_now() {
        let f = fixture(10);
        f.clock.advance(Duration::days(12));
        assert!(f.store.get(f.challenge_id, 1).unwrap().is_completed);
        assert!(matches!(
            f.resets.reset(f.challenge_id, 1, t0() + Duration::days(11), ""),
            Err(CoreError::Conflict(_))
        ));

        let anchor = f.resets.continue_started_challenge(f.challenge_id, 1).unwrap();
        assert_eq!(anchor, t0() + Duration::days(12));

        let detail = f.store.get(f.challenge_id, 1).unwrap();
        assert!(!detail.is_completed);
        assert_eq!(detail.recent_reset_date_time, anchor);
        assert!(f.store.reset_info(f.challenge_id, 1).unwrap().records.is_empty());
    }

    #[test]
    fn free_mode_never_completes() {
        let f = fixture(0);
        f.clock.advance(Duration::days(1_000));
        assert!(matches!(
            f.resets.continue_started_challenge(f.challenge_id, 1),
            Err(CoreError::Conflict(_))
        ));
        let record = f
            .resets
            .reset(f.challenge_id, 1, t0() + Duration::days(999), "")
            .unwrap();
        assert_eq!(record.record_in_seconds, 999 * 86_400);
    }

    proptest! {
        #[test]
        fn record_matches_elapsed(gaps in proptest::collection::vec(0i64..(3 * 86_400), 1..8)) {
            let f = fixture(0);
            let total: i64 = gaps.iter().sum();
            f.clock.set(t0() + Duration::seconds(total));

            let mut anchor = t0();
            for (i, gap) in gaps.iter().enumerate() {
                let at = anchor + Duration::seconds(*gap);
                let record = f.resets.reset(f.challenge_id, 1, at, "").unwrap();
                prop_assert_eq!(record.record_in_seconds, *gap);
                prop_assert!(record.record_in_seconds >= 0);
                let info = f.store.reset_info(f.challenge_id, 1).unwrap();
                prop_assert_eq!(info.recent_reset_date_time, at);
                prop_assert_eq!(info.reset_count(), i + 1);
                anchor = at;
            }
        }
    }
}
