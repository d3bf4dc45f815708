use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{ChallengeId, MemberId, UserId};
use crate::error::ValidationError;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Lifecycle of one participation in a challenge.
///
/// ```text
/// Waiting -> Started -> (reset) Started
///               |
///               +-> Completed -> (continue) Started
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Waiting,
    Started,
    Completed,
}

/// User-supplied configuration for a new challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// 0 means free mode (no target).
    #[serde(default)]
    pub target_days: u32,
    pub max_participant_count: u32,
    #[serde(default)]
    pub is_private: bool,
}

impl ChallengeDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check_text("title", &self.title, None)?;
        if self.max_participant_count == 0 {
            return Err(ValidationError::InvalidValue {
                field: "max_participant_count".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// A challenge as stored. Shared by all of its participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: ChallengeId,
    pub owner_user_id: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub target_days: u32,
    pub max_participant_count: u32,
    pub is_private: bool,
    /// None while the challenge is still waiting for its start.
    pub start_date_time: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl Challenge {
    pub fn is_free_mode(&self) -> bool {
        self.target_days == 0
    }

    pub fn is_started(&self) -> bool {
        self.start_date_time.is_some()
    }
}

/// One user's participation in a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub member_id: MemberId,
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub joined_at: NaiveDateTime,
    /// Streak anchor. Set when the challenge starts, rewritten by every
    /// reset and continue.
    pub recent_reset_date_time: Option<NaiveDateTime>,
}

/// A started challenge as seen by one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedChallenge {
    pub challenge_id: ChallengeId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub target_days: u32,
    pub current_participant_count: u32,
    pub max_participant_count: u32,
    pub recent_reset_date_time: NaiveDateTime,
    pub start_date_time: NaiveDateTime,
    pub is_free_mode: bool,
    pub is_completed: bool,
    pub is_private: bool,
    /// Snapshot from the ranking taken at read time.
    pub rank: u32,
    pub score_rank: u32,
}

impl StartedChallenge {
    pub fn status(&self) -> ChallengeStatus {
        if self.is_completed {
            ChallengeStatus::Completed
        } else {
            ChallengeStatus::Started
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ChallengeDraft {
        ChallengeDraft {
            title: "No sugar".into(),
            description: String::new(),
            category: "DIET".into(),
            target_days: 30,
            max_participant_count: 5,
            is_private: false,
        }
    }

    #[test]
    fn draft_validation() {
        assert!(draft().validate().is_ok());

        let mut blank = draft();
        blank.title = "  ".into();
        assert!(matches!(blank.validate(), Err(ValidationError::Empty { .. })));

        let mut nobody = draft();
        nobody.max_participant_count = 0;
        assert!(matches!(
            nobody.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn draft_deserializes_with_defaults() {
        let d: ChallengeDraft =
            serde_json::from_str(r#"{"title":"Quit","max_participant_count":2}"#).unwrap();
        assert_eq!(d.target_days, 0);
        assert!(!d.is_private);
    }
}
