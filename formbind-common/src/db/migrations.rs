//! Database schema migrations
//!
//! Versioned data migrations tracked in the `schema_version` table. Column
//! additions are handled by schema sync; migrations here rewrite data.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - users upgrade from any older version
//! 2. **Always add new migrations** - one function per change, bump `CURRENT_SCHEMA_VERSION`
//! 3. **Idempotent** - each migration must be safe to run twice

use crate::entity::EntityKind;
use crate::journal::{AnswerSource, ExtendedData};
use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

pub(crate) async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Latest applied schema version (0 when none)
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, ?)")
        .bind(version)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({}). Proceeding with caution.",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    Ok(())
}

/// Migration v1: rewrite stage journals into canonical form
///
/// Older journals stored bare values, used `revisionId` instead of
/// `questionRevisionId`, omitted `source`, or kept null placeholders and
/// empty objects. Re-encoding through the codec normalizes all of these.
/// Row versions are left untouched: the answers themselves do not change.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: normalize extended-data journals");

    for kind in EntityKind::STAGES {
        let table = kind.table_name();
        let rows: Vec<(String, String)> = sqlx::query_as(&format!(
            "SELECT guid, extended_data FROM {} WHERE extended_data IS NOT NULL",
            table
        ))
        .fetch_all(pool)
        .await?;

        let mut rewritten = 0;
        for (guid, raw) in rows {
            let journal = ExtendedData::parse(Some(&raw), AnswerSource::from(kind));
            let canonical = journal.to_column()?;
            if canonical.as_deref() == Some(raw.as_str()) {
                continue;
            }

            sqlx::query(&format!("UPDATE {} SET extended_data = ? WHERE guid = ?", table))
                .bind(canonical)
                .bind(&guid)
                .execute(pool)
                .await?;
            rewritten += 1;
        }

        info!(table, rewritten, "  ✓ Normalized journals");
    }

    Ok(())
}
