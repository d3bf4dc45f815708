//! Start reasons attached to a participation.
//!
//! Each participant keeps an ordered list of free-text reasons for taking on
//! a challenge. Reasons may be added while the challenge is waiting or
//! running; insertion order is display order.

use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{CoreError, Result, ValidationError};
use crate::model::{ChallengeId, ReasonId, StartReason, UserId};
use crate::record_store::require_participation;
use crate::storage::{ChallengeDb, LimitsConfig};

/// Limit applied to reason text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReasonPolicy {
    pub max_chars: Option<usize>,
}

impl From<&LimitsConfig> for ReasonPolicy {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            max_chars: Some(limits.reason_max_chars),
        }
    }
}

pub struct ReasonLog {
    db: Arc<ChallengeDb>,
    clock: Arc<dyn Clock>,
    policy: ReasonPolicy,
}

impl ReasonLog {
    pub fn new(db: Arc<ChallengeDb>, clock: Arc<dyn Clock>, policy: ReasonPolicy) -> Self {
        Self { db, clock, policy }
    }

    /// Append a reason to the caller's list.
    ///
    /// # Errors
    /// `Validation` for blank or over-long text; `NotFound` / `Forbidden`
    /// when the challenge or membership is missing.
    pub fn add(&self, challenge_id: ChallengeId, caller: UserId, content: &str) -> Result<ReasonId> {
        ValidationError::check_text("reason", content, self.policy.max_chars)?;

        self.db.locks().with_lock(challenge_id, || {
            let (_, member) = require_participation(&self.db, challenge_id, caller)?;
            let reason_id = self
                .db
                .insert_reason(member.member_id, content, self.clock.now())?;
            info!(challenge_id, reason_id, "reason added");
            Ok(reason_id)
        })
    }

    /// Delete one of the caller's reasons.
    ///
    /// # Errors
    /// `NotFound` when the reason does not exist or belongs to somebody else.
    pub fn delete(&self, reason_id: ReasonId, caller: UserId) -> Result<()> {
        let not_found = || CoreError::not_found(format!("reason {reason_id}"));
        let challenge_id = self.db.reason(reason_id)?.ok_or_else(not_found)?.challenge_id;

        self.db.locks().with_lock(challenge_id, || {
            let reason = self.db.reason(reason_id)?.ok_or_else(not_found)?;
            let owned = self
                .db
                .membership(reason.challenge_id, caller)?
                .is_some_and(|m| m.member_id == reason.member_id);
            if !owned {
                debug!(reason_id, caller, "reason not owned by caller");
                return Err(not_found());
            }
            if !self.db.delete_reason(reason_id)? {
                return Err(not_found());
            }
            info!(challenge_id, reason_id, "reason deleted");
            Ok(())
        })
    }

    /// The caller's reasons for a challenge, oldest first.
    ///
    /// # Errors
    /// `NotFound` / `Forbidden` when the challenge or membership is missing.
    pub fn list(&self, challenge_id: ChallengeId, caller: UserId) -> Result<Vec<StartReason>> {
        let (_, member) = require_participation(&self.db, challenge_id, caller)?;
        self.db.reasons(member.member_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::ChallengeDraft;
    use crate::record_store::RecordStore;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 10)
            .unwrap()
            .and_hms_opt(21, 0, 0)
            .unwrap()
    }

    fn setup() -> (RecordStore, ReasonLog, Arc<ManualClock>, ChallengeId) {
        let db = Arc::new(ChallengeDb::open_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0()));
        let store = RecordStore::new(db.clone(), clock.clone());
        let draft = ChallengeDraft {
            title: "Quit smoking".into(),
            description: String::new(),
            category: "SMOKE".into(),
            target_days: 100,
            max_participant_count: 5,
            is_private: true,
        };
        let (id, _) = store.create_challenge(&draft, 1).unwrap();
        store.join(id, 2).unwrap();
        let log = ReasonLog::new(db, clock.clone(), ReasonPolicy { max_chars: Some(10) });
        (store, log, clock, id)
    }

    #[test]
    fn list_keeps_insertion_order() {
        let (_, log, clock, id) = setup();
        for text in ["health", "money", "family"] {
            log.add(id, 1, text).unwrap();
            clock.advance(Duration::minutes(1));
        }
        let texts: Vec<_> = log.list(id, 1).unwrap().into_iter().map(|r| r.content).collect();
        assert_eq!(texts, vec!["health", "money", "family"]);
        assert!(log.list(id, 2).unwrap().is_empty());
    }

    #[test]
    fn add_validates_text() {
        let (_, log, _, id) = setup();
        assert!(matches!(
            log.add(id, 1, "  "),
            Err(CoreError::Validation(ValidationError::Empty { .. }))
        ));
        assert!(matches!(
            log.add(id, 1, "much too long"),
            Err(CoreError::Validation(ValidationError::TooLong { max: 10, .. }))
        ));
        assert!(log.list(id, 1).unwrap().is_empty());
    }

    #[test]
    fn add_requires_participation() {
        let (_, log, _, id) = setup();
        assert!(matches!(log.add(id, 3, "why not"), Err(CoreError::Forbidden(_))));
        assert!(matches!(log.add(id + 5, 1, "why not"), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn delete_only_own_reasons() {
        let (_, log, _, id) = setup();
        let mine = log.add(id, 1, "sleep").unwrap();
        let theirs = log.add(id, 2, "running").unwrap();

        assert!(matches!(log.delete(theirs, 1), Err(CoreError::NotFound(_))));
        assert!(matches!(log.delete(999, 1), Err(CoreError::NotFound(_))));

        log.delete(mine, 1).unwrap();
        assert!(log.list(id, 1).unwrap().is_empty());
        assert_eq!(log.list(id, 2).unwrap().len(), 1);
        assert!(matches!(log.delete(mine, 1), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn deleting_challenge_drops_reasons() {
        let (store, log, _, id) = setup();
        let reason = log.add(id, 2, "focus").unwrap();
        store.delete(id, 2).unwrap();
        assert!(matches!(log.delete(reason, 2), Err(CoreError::NotFound(_))));
        assert!(matches!(log.list(id, 2), Err(CoreError::NotFound(_))));
    }
}
