//! refbot CLI - Telegram bot that registers users and tracks referrals
//!
//! - `run`: apply migrations, then long-poll the Bot API and answer `/start`
//! - `migrate`: apply migrations and exit

use anyhow::Result;
use clap::Parser;

mod commands;
mod config;
mod handlers;
mod telegram;
mod tracing_setup;

use config::{Cli, Commands};
use tracing_setup::TracingConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    tracing_setup::init(&TracingConfig { debug: cli.debug })?;

    match cli.command {
        Commands::Run(args) => commands::run_bot(&cli.database, args).await?,
        Commands::Migrate => commands::run_migrate(&cli.database).await?,
    }
    Ok(())
}
