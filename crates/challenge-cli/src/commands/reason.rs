//! Start reason commands for CLI.

use clap::Subcommand;
use serde_json::json;

use super::{print_json, CliResult, Session};
use challenge_core::UserId;

#[derive(Subcommand)]
pub enum ReasonAction {
    /// Add a reason for starting
    Add {
        /// Challenge ID
        challenge_id: i64,
        /// Reason text
        text: String,
    },
    /// Delete one of your reasons
    Delete {
        /// Challenge ID
        challenge_id: i64,
        /// Reason ID
        reason_id: i64,
    },
    /// List your reasons, oldest first
    List {
        /// Challenge ID
        challenge_id: i64,
    },
}

pub async fn run(action: ReasonAction, user: Option<UserId>) -> CliResult {
    let repo = Session::open(user)?.repository();

    match action {
        ReasonAction::Add { challenge_id, text } => {
            let reason_id = repo.add_reason(challenge_id, &text).await?;
            print_json(&json!({ "reason_id": reason_id }))?;
        }
        ReasonAction::Delete {
            challenge_id,
            reason_id,
        } => {
            repo.delete_reason(challenge_id, reason_id).await?;
            print_json(&json!({ "deleted": reason_id }))?;
        }
        ReasonAction::List { challenge_id } => {
            print_json(&repo.start_reasons(challenge_id).await?)?;
        }
    }
    Ok(())
}
