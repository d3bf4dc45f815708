use clap::{Parser, Subcommand};
use challenge_core::UserId;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "challenge-cli", version, about = "ChallengeTogether CLI")]
struct Cli {
    /// Act as this user (defaults to `user_id` from the config file)
    #[arg(long, global = true)]
    user: Option<UserId>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Challenge lifecycle
    Challenge {
        #[command(subcommand)]
        action: commands::challenge::ChallengeAction,
    },
    /// Record a relapse
    Reset(commands::reset::ResetArgs),
    /// Show the reset history of a challenge
    History {
        /// Challenge ID
        challenge_id: i64,
    },
    /// Show recovery progress of a challenge
    Progress {
        /// Challenge ID
        challenge_id: i64,
    },
    /// Show the leaderboard of a challenge
    Rank {
        /// Challenge ID
        challenge_id: i64,
    },
    /// Reasons for starting
    Reason {
        #[command(subcommand)]
        action: commands::reason::ReasonAction,
    },
    /// Membership moderation
    Member {
        #[command(subcommand)]
        action: commands::member::MemberAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    // stdout carries JSON; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let user = cli.user;

    let result = match cli.command {
        Commands::Challenge { action } => commands::challenge::run(action, user).await,
        Commands::Reset(args) => commands::reset::run(args, user).await,
        Commands::History { challenge_id } => commands::reset::history(challenge_id, user).await,
        Commands::Progress { challenge_id } => commands::reset::progress(challenge_id, user).await,
        Commands::Rank { challenge_id } => commands::rank::run(challenge_id, user).await,
        Commands::Reason { action } => commands::reason::run(action, user).await,
        Commands::Member { action } => commands::member::run(action, user).await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
