//! Subcommand implementations

use anyhow::{Context, Result};
use refbot_db::{create_pool_with_options, PgPool};

use crate::config::DatabaseArgs;

pub mod migrate;
pub mod run;

pub use migrate::run_migrate;
pub use run::run_bot;

/// Connect and bring the schema up to date.
async fn connect_and_migrate(db: &DatabaseArgs) -> Result<PgPool> {
    let pool = create_pool_with_options(&db.database_url, db.max_connections)
        .await
        .context("Failed to create database pool")?;
    refbot_db::MIGRATOR
        .run(&pool)
        .await
        .context("Failed to apply migrations")?;
    Ok(pool)
}
