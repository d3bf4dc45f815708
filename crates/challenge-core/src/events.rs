use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{ChallengeId, MemberId, ReasonId};

/// Every accepted mutation produces an Event.
/// Subscriptions listen for them to know when to re-fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChallengeEvent {
    ResetApplied {
        challenge_id: ChallengeId,
        reset_date_time: NaiveDateTime,
        record_in_seconds: i64,
    },
    Continued {
        challenge_id: ChallengeId,
        at: NaiveDateTime,
    },
    ReasonAdded {
        challenge_id: ChallengeId,
        reason_id: ReasonId,
    },
    ReasonDeleted {
        challenge_id: ChallengeId,
        reason_id: ReasonId,
    },
    ChallengeDeleted {
        challenge_id: ChallengeId,
    },
    MemberRemoved {
        challenge_id: ChallengeId,
        member_id: MemberId,
    },
    /// The system clock moved; every time-derived view is stale.
    TimeChanged,
    /// Explicit refresh. `None` targets every subscription.
    RefreshRequested {
        challenge_id: Option<ChallengeId>,
    },
}

impl ChallengeEvent {
    /// Whether a view of `challenge_id` must be re-fetched.
    pub fn affects(&self, challenge_id: ChallengeId) -> bool {
        match self {
            Self::TimeChanged | Self::RefreshRequested { challenge_id: None } => true,
            Self::RefreshRequested {
                challenge_id: Some(id),
            } => *id == challenge_id,
            Self::ResetApplied { challenge_id: id, .. }
            | Self::Continued { challenge_id: id, .. }
            | Self::ReasonAdded { challenge_id: id, .. }
            | Self::ReasonDeleted { challenge_id: id, .. }
            | Self::ChallengeDeleted { challenge_id: id }
            | Self::MemberRemoved { challenge_id: id, .. } => *id == challenge_id,
        }
    }
}

const DEFAULT_CAPACITY: usize = 64;

/// Fan-out of [`ChallengeEvent`]s to any number of subscribers.
///
/// Publishing never blocks. A subscriber that falls more than the channel
/// capacity behind observes `Lagged` and should re-fetch.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChallengeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: ChallengeEvent) -> usize {
        tracing::trace!(?event, "publishing event");
        // No receivers is not an error.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChallengeEvent> {
        self.sender.subscribe()
    }

    pub fn notify_time_changed(&self) -> usize {
        self.publish(ChallengeEvent::TimeChanged)
    }

    pub fn request_refresh(&self, challenge_id: Option<ChallengeId>) -> usize {
        self.publish(ChallengeEvent::RefreshRequested { challenge_id })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
