use clap::Subcommand;
use serde_json::json;

use super::{print_json, CliResult, Session};
use challenge_core::UserId;

#[derive(Subcommand)]
pub enum MemberAction {
    /// Forcibly remove a member (challenge owner only)
    Remove {
        /// Challenge ID
        challenge_id: i64,
        /// Member ID
        member_id: i64,
    },
}

pub async fn run(action: MemberAction, user: Option<UserId>) -> CliResult {
    let repo = Session::open(user)?.repository();
    match action {
        MemberAction::Remove {
            challenge_id,
            member_id,
        } => {
            repo.remove_member(challenge_id, member_id).await?;
            print_json(&json!({ "removed": member_id }))
        }
    }
}
