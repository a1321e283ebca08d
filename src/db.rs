//! Database pool management, migration execution and readiness checks.
//!
//! Migrations run under a Postgres advisory lock shared by every binary
//! so that concurrently starting workers serialize schema changes.

use std::time::Duration;

use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr,
    Statement,
};
use thiserror::Error;
use tracing::info;

use crate::config::AppConfig;

/// Advisory lock key shared by all binaries ("tranche" in hex).
const MIGRATION_LOCK_ID: i64 = 0x7472616e636865;

/// Errors that can occur while opening or validating the database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection failed: {0}")]
    Connection(#[from] DbErr),
    #[error("pending migrations: {0}")]
    PendingMigrations(String),
}

/// Opens a connection pool, pings it, and applies pending migrations
/// under the shared advisory lock.
pub async fn open(cfg: &AppConfig) -> Result<DatabaseConnection, DatabaseError> {
    let db = init_pool(cfg).await?;
    run_migrations(&db).await?;
    Ok(db)
}

/// Initializes the connection pool without touching the schema.
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection, DatabaseError> {
    let mut options = ConnectOptions::new(cfg.pg_dsn.clone());
    options
        .max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms));

    let db = Database::connect(options).await?;
    db.ping().await?;
    Ok(db)
}

/// Applies pending migrations. On Postgres the run is serialized across
/// processes via `pg_advisory_lock`; each migration commits in its own
/// transaction inside the migrator.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    let backend = db.get_database_backend();
    if backend != DatabaseBackend::Postgres {
        Migrator::up(db, None).await?;
        return Ok(());
    }

    db.execute(Statement::from_string(
        backend,
        format!("SELECT pg_advisory_lock({MIGRATION_LOCK_ID})"),
    ))
    .await?;

    let result = Migrator::up(db, None).await;

    let unlock = db
        .execute(Statement::from_string(
            backend,
            format!("SELECT pg_advisory_unlock({MIGRATION_LOCK_ID})"),
        ))
        .await;

    result?;
    unlock?;
    info!("migrations up to date");
    Ok(())
}

/// Validates connectivity and confirms no migrations are pending. Used by
/// readiness probes; never mutates the schema and never takes the lock.
pub async fn ready(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    db.ping().await?;

    let pending = Migrator::get_pending_migrations(db).await?;
    if !pending.is_empty() {
        let names: Vec<&str> = pending.iter().map(|m| m.name()).collect();
        return Err(DatabaseError::PendingMigrations(names.join(",")));
    }
    Ok(())
}
