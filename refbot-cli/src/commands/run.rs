//! `refbot run`: the long-polling bot

use std::sync::Arc;

use anyhow::{Context, Result};
use refbot_db::UserDao;
use tracing::info;

use super::connect_and_migrate;
use crate::config::{DatabaseArgs, RunArgs};
use crate::telegram::{run_polling, BotApi};

/// Migrate, then serve start commands until Ctrl-C.
pub async fn run_bot(db: &DatabaseArgs, args: RunArgs) -> Result<()> {
    let pool = connect_and_migrate(db).await?;
    let users = Arc::new(UserDao::new(pool.clone()));

    let api = BotApi::new(&args.api_url, &args.bot_token, args.poll_timeout())
        .context("Failed to build Telegram client")?;

    info!(api_url = %args.api_url, "starting bot");
    run_polling(api, users, args.poll_timeout()).await?;

    pool.close().await;
    Ok(())
}
