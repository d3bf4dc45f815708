//! Challenge lifecycle commands for CLI.

use clap::{Subcommand, ValueEnum};
use serde_json::json;

use super::{print_json, CliResult, Session};
use challenge_core::{ChallengeDraft, UserId};

#[derive(Clone, Copy, ValueEnum)]
pub enum ListKind {
    Started,
    Completed,
}

#[derive(Subcommand)]
pub enum ChallengeAction {
    /// Create a challenge; the acting user becomes its owner
    Create {
        /// Challenge title
        title: String,
        /// Description
        #[arg(long, default_value = "")]
        description: String,
        /// Category (e.g. SMOKE, ALCOHOL)
        #[arg(long, default_value = "ETC")]
        category: String,
        /// Target in days; 0 for free mode
        #[arg(long, default_value = "0")]
        target_days: u32,
        /// Maximum number of participants
        #[arg(long, default_value = "10")]
        max_participants: u32,
        /// Hide from public listings
        #[arg(long)]
        private: bool,
    },
    /// Join a waiting challenge
    Join {
        /// Challenge ID
        id: i64,
    },
    /// Start a waiting challenge (owner only)
    Start {
        /// Challenge ID
        id: i64,
    },
    /// Show a started challenge
    Show {
        /// Challenge ID
        id: i64,
    },
    /// List started or completed challenges
    List {
        #[arg(value_enum, default_value = "started")]
        kind: ListKind,
    },
    /// Delete a challenge with all of its history
    Delete {
        /// Challenge ID
        id: i64,
    },
    /// Continue a completed challenge from now
    Continue {
        /// Challenge ID
        id: i64,
    },
}

pub async fn run(action: ChallengeAction, user: Option<UserId>) -> CliResult {
    let session = Session::open(user)?;
    let repo = session.repository();

    match action {
        ChallengeAction::Create {
            title,
            description,
            category,
            target_days,
            max_participants,
            private,
        } => {
            let draft = ChallengeDraft {
                title,
                description,
                category,
                target_days,
                max_participant_count: max_participants,
                is_private: private,
            };
            let (challenge_id, member_id) = session.core.store.create_challenge(&draft, session.user)?;
            print_json(&json!({ "challenge_id": challenge_id, "member_id": member_id }))?;
        }
        ChallengeAction::Join { id } => {
            let member_id = session.core.store.join(id, session.user)?;
            print_json(&json!({ "challenge_id": id, "member_id": member_id }))?;
        }
        ChallengeAction::Start { id } => {
            let at = session.core.store.start(id, session.user)?;
            print_json(&json!({ "challenge_id": id, "start_date_time": at }))?;
        }
        ChallengeAction::Show { id } => {
            print_json(&repo.detail(id).await?)?;
        }
        ChallengeAction::List { kind } => {
            let list = match kind {
                ListKind::Started => repo.started_challenges().await?,
                ListKind::Completed => repo.completed_challenges().await?,
            };
            print_json(&list)?;
        }
        ChallengeAction::Delete { id } => {
            repo.delete_challenge(id).await?;
            print_json(&json!({ "deleted": id }))?;
        }
        ChallengeAction::Continue { id } => {
            let at = repo.continue_challenge(id).await?;
            print_json(&json!({ "challenge_id": id, "recent_reset_date_time": at }))?;
        }
    }
    Ok(())
}
