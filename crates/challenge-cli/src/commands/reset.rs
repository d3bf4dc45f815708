//! Reset, history and progress commands.

use clap::Args;

use super::{print_json, CliResult, Session};
use challenge_core::clock::parse_datetime;
use challenge_core::UserId;

#[derive(Args)]
pub struct ResetArgs {
    /// Challenge ID
    challenge_id: i64,
    /// When the relapse happened (YYYY-MM-DDTHH:MM:SS, default: now)
    #[arg(long)]
    at: Option<String>,
    /// Memo stored with the reset
    #[arg(long, default_value = "")]
    memo: String,
}

pub async fn run(args: ResetArgs, user: Option<UserId>) -> CliResult {
    let session = Session::open(user)?;
    let at = match args.at {
        Some(text) => parse_datetime(&text).ok_or(format!("invalid date-time: {text}"))?,
        None => session.core.now(),
    };
    let record = session
        .repository()
        .reset(args.challenge_id, at, &args.memo)
        .await?;
    print_json(&record)
}

pub async fn history(challenge_id: i64, user: Option<UserId>) -> CliResult {
    let session = Session::open(user)?;
    print_json(&session.repository().reset_info(challenge_id).await?)
}

pub async fn progress(challenge_id: i64, user: Option<UserId>) -> CliResult {
    let session = Session::open(user)?;
    print_json(&session.repository().progress(challenge_id).await?)
}
