use super::{print_json, CliResult, Session};
use challenge_core::UserId;

pub async fn run(challenge_id: i64, user: Option<UserId>) -> CliResult {
    let session = Session::open(user)?;
    print_json(&session.repository().ranking(challenge_id).await?)
}
