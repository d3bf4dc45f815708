//! Streak and recovery-progress calculation.
//!
//! Everything here is a pure function of a streak anchor (the most recent
//! reset or start), the challenge target and an explicit `now`. Nothing is
//! cached or written back; callers recompute on every read.

use chrono::NaiveDateTime;

use crate::model::{ChallengeStatus, RecoveryProgress, ResetRecord, StartedChallenge, SECONDS_PER_DAY};

/// The inputs a streak computation depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streak {
    anchor: NaiveDateTime,
    target_days: u32,
}

impl Streak {
    pub fn new(anchor: NaiveDateTime, target_days: u32) -> Self {
        Self {
            anchor,
            target_days,
        }
    }

    pub fn of(challenge: &StartedChallenge) -> Self {
        Self::new(challenge.recent_reset_date_time, challenge.target_days)
    }

    pub fn anchor(&self) -> NaiveDateTime {
        self.anchor
    }

    pub fn is_free_mode(&self) -> bool {
        self.target_days == 0
    }

    /// Target duration in seconds, `None` in free mode.
    pub fn target_seconds(&self) -> Option<i64> {
        if self.is_free_mode() {
            None
        } else {
            Some(i64::from(self.target_days) * SECONDS_PER_DAY)
        }
    }

    /// Seconds since the anchor. A `now` before the anchor yields 0.
    pub fn current_seconds(&self, now: NaiveDateTime) -> i64 {
        (now - self.anchor).num_seconds().max(0)
    }

    pub fn recovery_progress(&self, now: NaiveDateTime) -> RecoveryProgress {
        let elapsed_seconds = self.current_seconds(now);
        match self.target_seconds() {
            Some(target_seconds) => {
                let percent = (elapsed_seconds as f64 / target_seconds as f64 * 100.0)
                    .clamp(0.0, 100.0);
                RecoveryProgress::Targeted {
                    percent,
                    elapsed_seconds,
                    target_seconds,
                }
            }
            None => RecoveryProgress::FreeMode { elapsed_seconds },
        }
    }

    /// Whether the streak has run the full target without a reset.
    /// Always false in free mode.
    pub fn target_reached(&self, now: NaiveDateTime) -> bool {
        self.target_seconds()
            .is_some_and(|target| self.current_seconds(now) >= target)
    }

    pub fn status(&self, now: NaiveDateTime) -> ChallengeStatus {
        if self.target_reached(now) {
            ChallengeStatus::Completed
        } else {
            ChallengeStatus::Started
        }
    }
}

/// Total logged seconds: every recorded streak plus the running one.
pub fn score_seconds(history: &[ResetRecord], current_streak_seconds: i64) -> i64 {
    history
        .iter()
        .map(|r| r.record_in_seconds)
        .sum::<i64>()
        + current_streak_seconds
}

/// Longest streak so far, the running one included.
pub fn best_record_seconds(history: &[ResetRecord], current_streak_seconds: i64) -> i64 {
    history
        .iter()
        .map(|r| r.record_in_seconds)
        .max()
        .unwrap_or(0)
        .max(current_streak_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use proptest::prelude::*;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn record(seconds: i64) -> ResetRecord {
        ResetRecord {
            reset_record_id: 1,
            member_id: 1,
            reset_date_time: t0(),
            record_in_seconds: seconds,
            content: String::new(),
        }
    }

    #[test]
    fn current_streak_never_negative() {
        let streak = Streak::new(t0(), 30);
        assert_eq!(streak.current_seconds(t0() - Duration::hours(1)), 0);
        assert_eq!(streak.current_seconds(t0() + Duration::days(5)), 432_000);
    }

    #[test]
    fn progress_halfway() {
        let streak = Streak::new(t0(), 30);
        let progress = streak.recovery_progress(t0() + Duration::days(15));
        assert_eq!(progress.percent(), Some(50.0));
        assert_eq!(progress.elapsed_seconds(), 15 * SECONDS_PER_DAY);
    }

    #[test]
    fn progress_clamps_at_target() {
        let streak = Streak::new(t0(), 7);
        let progress = streak.recovery_progress(t0() + Duration::days(40));
        assert_eq!(progress.percent(), Some(100.0));
        assert!(streak.target_reached(t0() + Duration::days(7)));
        assert!(!streak.target_reached(t0() + Duration::days(7) - Duration::seconds(1)));
    }

    #[test]
    fn free_mode_has_no_percent() {
        let streak = Streak::new(t0(), 0);
        let progress = streak.recovery_progress(t0() + Duration::days(400));
        assert_eq!(
            progress,
            RecoveryProgress::FreeMode {
                elapsed_seconds: 400 * SECONDS_PER_DAY
            }
        );
        assert_eq!(streak.status(t0() + Duration::days(400)), ChallengeStatus::Started);
    }

    #[test]
    fn score_and_best_include_running_streak() {
        let history = vec![record(100), record(400), record(50)];
        assert_eq!(score_seconds(&history, 25), 575);
        assert_eq!(best_record_seconds(&history, 25), 400);
        assert_eq!(best_record_seconds(&history, 1_000), 1_000);
        assert_eq!(best_record_seconds(&[], 0), 0);
    }

    proptest! {
        #[test]
        fn progress_is_monotonic(
            target_days in 1u32..400,
            a in 0i64..(500 * SECONDS_PER_DAY),
            b in 0i64..(500 * SECONDS_PER_DAY),
        ) {
            let (earlier, later) = if a <= b { (a, b) } else { (b, a) };
            let streak = Streak::new(t0(), target_days);
            let p1 = streak.recovery_progress(t0() + Duration::seconds(earlier)).percent().unwrap();
            let p2 = streak.recovery_progress(t0() + Duration::seconds(later)).percent().unwrap();
            prop_assert!(p1 <= p2);
            prop_assert!((0.0..=100.0).contains(&p2));
        }

        #[test]
        fn progress_is_full_past_target(target_days in 1u32..400, extra in 0i64..1_000_000) {
            let streak = Streak::new(t0(), target_days);
            let now = t0() + Duration::seconds(i64::from(target_days) * SECONDS_PER_DAY + extra);
            prop_assert_eq!(streak.recovery_progress(now).percent(), Some(100.0));
            prop_assert_eq!(streak.status(now), ChallengeStatus::Completed);
        }
    }
}
