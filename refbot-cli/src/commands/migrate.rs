//! `refbot migrate`

use anyhow::Result;
use tracing::info;

use super::connect_and_migrate;
use crate::config::DatabaseArgs;

/// Apply pending migrations and exit.
pub async fn run_migrate(db: &DatabaseArgs) -> Result<()> {
    let pool = connect_and_migrate(db).await?;
    info!(applied = refbot_db::MIGRATOR.iter().count(), "migrations up to date");
    pool.close().await;
    Ok(())
}
