pub mod challenge;
pub mod config;
pub mod member;
pub mod rank;
pub mod reason;
pub mod reset;

use serde::Serialize;
use std::sync::Arc;

use challenge_core::{
    ChallengeCore, Config, EventBus, LocalTransport, StartedChallengeRepository, UserId,
};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Everything a command needs: config, the opened core and the acting user.
pub struct Session {
    pub core: Arc<ChallengeCore>,
    pub user: UserId,
    config: Config,
}

impl Session {
    /// `--user` wins over `user_id` in the config file.
    pub fn open(user: Option<UserId>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let user = match user {
            Some(user) => user,
            None => config.require_user()?,
        };
        let core = Arc::new(ChallengeCore::open(&config)?);
        tracing::debug!(user, "session opened");
        Ok(Self { core, user, config })
    }

    pub fn repository(&self) -> StartedChallengeRepository<LocalTransport> {
        StartedChallengeRepository::new(
            Arc::new(LocalTransport::new(self.core.clone(), self.user)),
            EventBus::new(),
            self.core.clock(),
            self.config.timeout(),
        )
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
