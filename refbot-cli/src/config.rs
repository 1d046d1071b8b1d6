//! Command-line and environment configuration
//!
//! Every setting can come from a flag, the environment, or a `.env` file
//! (loaded by `dotenvy` before parsing).

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "refbot",
    author,
    version,
    about = "Telegram bot that registers users on /start and tracks referrals"
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(flatten)]
    pub database: DatabaseArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply migrations, then poll Telegram for updates until Ctrl-C
    Run(RunArgs),
    /// Apply database migrations and exit
    Migrate,
}

#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Maximum number of pooled database connections
    #[arg(long, env = "REFBOT_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Telegram Bot API token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,

    /// Bot API base URL
    #[arg(long, env = "TELEGRAM_API_URL", default_value = "https://api.telegram.org")]
    pub api_url: String,

    /// Long-polling timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub poll_timeout: u64,
}

impl RunArgs {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_flags() {
        let cli = Cli::try_parse_from([
            "refbot",
            "--database-url",
            "postgres://localhost/refbot",
            "run",
            "--bot-token",
            "123:abc",
            "--poll-timeout",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.database.max_connections, 5);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.bot_token, "123:abc");
                assert_eq!(args.api_url, "https://api.telegram.org");
                assert_eq!(args.poll_timeout(), Duration::from_secs(5));
            }
            Commands::Migrate => panic!("expected run"),
        }
    }
}
