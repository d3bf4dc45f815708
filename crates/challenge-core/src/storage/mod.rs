mod config;
pub mod database;
mod locks;
pub mod migrations;

pub use config::{Config, LimitsConfig, TransportConfig};
pub use database::{ChallengeDb, ResetStats};
pub use locks::ChallengeLocks;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `CHALLENGE_DATA_DIR` overrides the location outright. Otherwise this is
/// `~/.config/challengetogether[-dev]/`, with the `-dev` suffix selected by
/// `CHALLENGE_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("CHALLENGE_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("CHALLENGE_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("challengetogether-dev")
            } else {
                base_dir.join("challengetogether")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
