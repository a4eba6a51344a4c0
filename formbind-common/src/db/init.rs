//! Database initialization
//!
//! Opens (creating if needed) the SQLite database and brings the schema up
//! to date: base tables, typed-column sync, then versioned migrations.

use crate::db::migrations::{create_schema_version_table, run_migrations};
use crate::db::table_schemas::{
    create_question_answers_table, create_stage_table, create_technologies_table,
    sync_all_table_schemas,
};
use crate::entity::EntityKind;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Limited to one connection: every SQLite in-memory connection is its own
/// database.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create base tables, sync typed columns and run migrations (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Phase 1: base tables
    create_schema_version_table(pool).await?;
    create_technologies_table(pool).await?;
    for kind in EntityKind::STAGES {
        create_stage_table(pool, kind).await?;
    }
    create_question_answers_table(pool).await?;

    // Phase 2: typed columns from the field registry
    sync_all_table_schemas(pool).await?;

    // Phase 3: data migrations
    run_migrations(pool).await?;

    Ok(())
}
