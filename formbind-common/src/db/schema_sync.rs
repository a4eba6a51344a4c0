//! Automatic Schema Synchronization
//!
//! Typed columns are declared in the entity field registry. When a
//! questionnaire grows a new typed field, the column is added to the
//! existing table on startup instead of requiring a hand-written migration.
//!
//! Three-phase initialization:
//! 1. **CREATE TABLE IF NOT EXISTS** - structural columns only
//! 2. **Auto-Sync** - add missing typed columns via ALTER TABLE (THIS MODULE)
//! 3. **Versioned Migrations** - data rewrites (migrations.rs)

use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

/// Column definition with SQL constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    /// SQL type (e.g., "TEXT", "INTEGER", "REAL")
    pub sql_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            default_value: None,
        }
    }

    /// Mark column as NOT NULL
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Set DEFAULT value (SQL literal)
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Clause used by ALTER TABLE ADD COLUMN
    ///
    /// SQLite only accepts NOT NULL on added columns when a default exists.
    fn add_column_clause(&self) -> String {
        let mut clause = format!("{} {}", self.name, self.sql_type);
        match (&self.default_value, self.not_null) {
            (Some(default), true) => clause.push_str(&format!(" NOT NULL DEFAULT {}", default)),
            (Some(default), false) => clause.push_str(&format!(" DEFAULT {}", default)),
            (None, _) => {}
        }
        clause
    }
}

/// Column as reported by PRAGMA table_info
#[derive(Debug, Clone)]
pub struct ActualColumn {
    pub name: String,
    pub type_name: String,
}

/// Drift between expected and actual table schema
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaDrift {
    /// Column missing from database (auto-fixable)
    MissingColumn { table: String, column: ColumnDefinition },
    /// Column type mismatch (requires manual migration)
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },
}

/// Expected schema for one table
pub trait TableSchema {
    fn table_name(&self) -> &'static str;

    fn expected_columns(&self) -> Vec<ColumnDefinition>;
}

/// Read actual columns of a table
pub async fn introspect_table(pool: &SqlitePool, table_name: &str) -> Result<Vec<ActualColumn>> {
    let rows = sqlx::query("SELECT cid, name, type FROM pragma_table_info(?) ORDER BY cid")
        .bind(table_name)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| ActualColumn {
            name: row.get("name"),
            type_name: row.get("type"),
        })
        .collect())
}

/// Compare expected columns to the actual table
pub fn compare(table_name: &str, expected: &[ColumnDefinition], actual: &[ActualColumn]) -> Vec<SchemaDrift> {
    expected
        .iter()
        .filter_map(|col| match actual.iter().find(|a| a.name.eq_ignore_ascii_case(&col.name)) {
            None => Some(SchemaDrift::MissingColumn {
                table: table_name.to_string(),
                column: col.clone(),
            }),
            Some(a) if !types_compatible(&col.sql_type, &a.type_name) => Some(SchemaDrift::TypeMismatch {
                table: table_name.to_string(),
                column: col.name.clone(),
                expected: col.sql_type.clone(),
                actual: a.type_name.clone(),
            }),
            Some(_) => None,
        })
        .collect()
}

/// SQLite type affinity comparison
fn types_compatible(expected: &str, actual: &str) -> bool {
    fn affinity(t: &str) -> &'static str {
        let t = t.to_uppercase();
        if t.contains("INT") {
            "INTEGER"
        } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
            "TEXT"
        } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
            "REAL"
        } else {
            "NUMERIC"
        }
    }
    affinity(expected) == affinity(actual)
}

/// Add missing columns to a table; type mismatches are only reported
///
/// Returns the number of columns added.
pub async fn sync_table(pool: &SqlitePool, schema: &dyn TableSchema) -> Result<usize> {
    let table = schema.table_name();
    let actual = introspect_table(pool, table).await?;

    if actual.is_empty() {
        warn!(table, "Table does not exist - skipping schema sync");
        return Ok(0);
    }

    let mut added = 0;
    for drift in compare(table, &schema.expected_columns(), &actual) {
        match drift {
            SchemaDrift::MissingColumn { table, column } => {
                let sql = format!("ALTER TABLE {} ADD COLUMN {}", table, column.add_column_clause());
                match sqlx::query(&sql).execute(pool).await {
                    Ok(_) => {
                        info!(table = %table, column = %column.name, "Added column");
                        added += 1;
                    }
                    // Concurrent initialization added it first
                    Err(sqlx::Error::Database(e)) if e.message().contains("duplicate column") => {
                        debug!(table = %table, column = %column.name, "Column already added");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            SchemaDrift::TypeMismatch { table, column, expected, actual } => {
                warn!(
                    "Type mismatch in {}.{}: expected '{}', found '{}'. Manual migration required.",
                    table, column, expected, actual
                );
            }
        }
    }

    Ok(added)
}
