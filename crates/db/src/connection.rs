use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;
use tracing::info;
use wsgate_core::config::RegistryConfig;

use crate::migrations;

pub type DbPool = sqlx::SqlitePool;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("registry connection failed: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("registry migration failed: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}

/// File-backed registries are created on first use.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
}

/// Connects and applies pending migrations.
pub async fn open_registry(config: &RegistryConfig) -> Result<DbPool, OpenError> {
    let pool = connect_with_settings(&config.url, config.max_connections, config.timeout_secs)
        .await
        .map_err(OpenError::Connect)?;
    migrations::run_pending(&pool).await.map_err(OpenError::Migrate)?;
    info!(
        event_name = "system.registry.opened",
        registry_url = %config.url,
        "workspace registry ready"
    );
    Ok(pool)
}
