//! Per-challenge mutual exclusion.
//!
//! Mutations of one challenge run one at a time in arrival order while
//! mutations of other challenges proceed. Reads never take these locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::model::ChallengeId;

#[derive(Debug, Default)]
pub struct ChallengeLocks {
    slots: Mutex<HashMap<ChallengeId, Arc<Mutex<()>>>>,
}

impl ChallengeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, challenge_id: ChallengeId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(challenge_id).or_default().clone()
    }

    /// Run `f` while holding the lock for `challenge_id`.
    pub fn with_lock<T>(&self, challenge_id: ChallengeId, f: impl FnOnce() -> T) -> T {
        let slot = self.slot(challenge_id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Drop the slot of a deleted challenge.
    pub fn forget(&self, challenge_id: ChallengeId) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&challenge_id);
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
