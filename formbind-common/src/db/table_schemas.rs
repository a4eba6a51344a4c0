//! Table Schema Definitions
//!
//! Base tables hold only structural columns (ids, foreign keys, row
//! versions, audit stamps). Typed entity columns come from the field
//! registry in `entity.rs` and are added by schema sync.

use crate::db::schema_sync::{sync_table, ColumnDefinition, TableSchema};
use crate::entity::EntityKind;
use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Schema of one entity table: structural columns plus registry fields
pub struct EntityTableSchema(pub EntityKind);

impl EntityTableSchema {
    fn structural_columns(&self) -> Vec<ColumnDefinition> {
        let mut columns = vec![ColumnDefinition::new("guid", "TEXT").not_null()];
        if self.0.is_stage() {
            columns.push(ColumnDefinition::new("technology_guid", "TEXT").not_null());
            columns.push(ColumnDefinition::new("extended_data", "TEXT"));
        }
        columns.extend([
            ColumnDefinition::new("row_version", "INTEGER").not_null().default("1"),
            ColumnDefinition::new("created_by", "TEXT"),
            ColumnDefinition::new("updated_by", "TEXT"),
            ColumnDefinition::new("created_at", "TEXT"),
            ColumnDefinition::new("updated_at", "TEXT"),
        ]);
        columns
    }
}

impl TableSchema for EntityTableSchema {
    fn table_name(&self) -> &'static str {
        self.0.table_name()
    }

    fn expected_columns(&self) -> Vec<ColumnDefinition> {
        let mut columns = self.structural_columns();
        for field in self.0.fields() {
            if !columns.iter().any(|c| c.name == field.column) {
                columns.push(ColumnDefinition::new(field.column, field.kind.sql_type()));
            }
        }
        columns
    }
}

pub(crate) async fn create_technologies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS technologies (
            guid TEXT PRIMARY KEY,
            tech_id TEXT NOT NULL UNIQUE,
            row_version INTEGER NOT NULL DEFAULT 1,
            created_by TEXT,
            updated_by TEXT,
            created_at TEXT,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Stage tables share one shape; each technology owns at most one row
pub(crate) async fn create_stage_table(pool: &SqlitePool, kind: EntityKind) -> Result<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            guid TEXT PRIMARY KEY,
            technology_guid TEXT NOT NULL UNIQUE REFERENCES technologies(guid) ON DELETE CASCADE,
            extended_data TEXT,
            row_version INTEGER NOT NULL DEFAULT 1,
            created_by TEXT,
            updated_by TEXT,
            created_at TEXT,
            updated_at TEXT
        )
        "#,
        kind.table_name()
    );
    sqlx::query(&sql).execute(pool).await?;

    Ok(())
}

/// One row per (technology, question key); the canonical answer store
pub(crate) async fn create_question_answers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS question_answers (
            technology_guid TEXT NOT NULL REFERENCES technologies(guid) ON DELETE CASCADE,
            question_key TEXT NOT NULL,
            value TEXT NOT NULL,
            question_revision_id TEXT,
            answered_by TEXT NOT NULL,
            answered_at TEXT NOT NULL,
            PRIMARY KEY (technology_guid, question_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Synchronize typed columns of every entity table
pub async fn sync_all_table_schemas(pool: &SqlitePool) -> Result<()> {
    let mut added = 0;
    for kind in EntityKind::ALL {
        added += sync_table(pool, &EntityTableSchema(kind)).await?;
    }
    info!(columns_added = added, "Schema synchronization complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_technology_schema_includes_registry_columns() {
        let columns = EntityTableSchema(EntityKind::Technology).expected_columns();
        assert!(columns.iter().any(|c| c.name == "tech_id"));
        assert!(columns.iter().any(|c| c.name == "technology_name" && c.sql_type == "TEXT"));
        assert!(columns.iter().any(|c| c.name == "patent_filed" && c.sql_type == "INTEGER"));
        assert!(!columns.iter().any(|c| c.name == "extended_data"));
    }

    #[test]
    fn test_stage_schema_has_journal_column() {
        let columns = EntityTableSchema(EntityKind::TriageStage).expected_columns();
        assert!(columns.iter().any(|c| c.name == "technology_guid" && c.not_null));
        assert!(columns.iter().any(|c| c.name == "extended_data"));
        assert!(columns.iter().any(|c| c.name == "impact_score" && c.sql_type == "REAL"));
    }
}
