//! The record store and its handlers wired to one database and clock.

use chrono::NaiveDateTime;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::ranking::RankingAggregator;
use crate::reasons::{ReasonLog, ReasonPolicy};
use crate::record_store::RecordStore;
use crate::reset_handler::{ResetHandler, ResetPolicy};
use crate::storage::{ChallengeDb, Config, LimitsConfig};

pub struct ChallengeCore {
    pub store: RecordStore,
    pub resets: ResetHandler,
    pub reasons: ReasonLog,
    pub ranking: RankingAggregator,
    clock: Arc<dyn Clock>,
}

impl ChallengeCore {
    pub fn new(db: Arc<ChallengeDb>, clock: Arc<dyn Clock>, limits: &LimitsConfig) -> Self {
        Self {
            store: RecordStore::new(db.clone(), clock.clone()),
            resets: ResetHandler::new(db.clone(), clock.clone(), ResetPolicy::from(limits)),
            reasons: ReasonLog::new(db.clone(), clock.clone(), ReasonPolicy::from(limits)),
            ranking: RankingAggregator::new(db, clock.clone()),
            clock,
        }
    }

    /// Open the default database with the system clock.
    pub fn open(config: &Config) -> Result<Self> {
        let db = Arc::new(ChallengeDb::open()?);
        Ok(Self::new(db, Arc::new(SystemClock), &config.limits))
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }
}
