//! Entity row operations
//!
//! Thin query functions over the entity tables. All take a connection so
//! they can run inside the caller's transaction.

pub mod answers;

use crate::error::Result;
use formbind_common::db::{StageRecord, TechnologyRecord};
use formbind_common::entity::SqlValue;
use formbind_common::EntityKind;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::query::Query;
use sqlx::{Sqlite, SqliteConnection};

const TECHNOLOGY_COLUMNS: &str =
    "guid, tech_id, row_version, created_by, updated_by, created_at, updated_at";

const STAGE_COLUMNS: &str =
    "guid, technology_guid, extended_data, row_version, created_by, updated_by, created_at, updated_at";

/// Column assignments for one insert or update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowWrite {
    pub columns: Vec<(&'static str, SqlValue)>,
}

impl RowWrite {
    pub fn set(&mut self, column: &'static str, value: SqlValue) {
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some((_, existing)) => *existing = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Audit stamp applied to every write
#[derive(Debug, Clone, Copy)]
pub struct WriteStamp<'a> {
    pub actor: &'a str,
    /// RFC 3339 timestamp
    pub at: &'a str,
}

fn bind_sql_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Integer(i) => query.bind(*i),
        SqlValue::Real(f) => query.bind(*f),
    }
}

/// Insert a new entity row at row version 1
pub async fn insert_entity(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    guid: &str,
    write: &RowWrite,
    stamp: WriteStamp<'_>,
) -> Result<()> {
    let names: Vec<&str> = write.columns.iter().map(|(c, _)| *c).collect();
    let mut column_list = String::from("guid");
    for name in &names {
        column_list.push_str(", ");
        column_list.push_str(name);
    }
    let placeholders = vec!["?"; names.len() + 1].join(", ");

    let sql = format!(
        "INSERT INTO {} ({}, row_version, created_by, updated_by, created_at, updated_at) \
         VALUES ({}, 1, ?, ?, ?, ?)",
        kind.table_name(),
        column_list,
        placeholders
    );

    let mut query = sqlx::query(&sql).bind(guid);
    for (_, value) in &write.columns {
        query = bind_sql_value(query, value);
    }
    query
        .bind(stamp.actor)
        .bind(stamp.actor)
        .bind(stamp.at)
        .bind(stamp.at)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Update an entity row and bump its row version
///
/// With `expected_version` the update only applies when the stored version
/// matches. Returns the number of rows affected; zero under the conditional
/// form means the caller lost an optimistic-concurrency race.
pub async fn update_entity(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    guid: &str,
    write: &RowWrite,
    expected_version: Option<i64>,
    stamp: WriteStamp<'_>,
) -> Result<u64> {
    let mut assignments = String::new();
    for (column, _) in &write.columns {
        assignments.push_str(column);
        assignments.push_str(" = ?, ");
    }

    let mut sql = format!(
        "UPDATE {} SET {}row_version = row_version + 1, updated_by = ?, updated_at = ? WHERE guid = ?",
        kind.table_name(),
        assignments
    );
    if expected_version.is_some() {
        sql.push_str(" AND row_version = ?");
    }

    let mut query = sqlx::query(&sql);
    for (_, value) in &write.columns {
        query = bind_sql_value(query, value);
    }
    query = query.bind(stamp.actor).bind(stamp.at).bind(guid);
    if let Some(expected) = expected_version {
        query = query.bind(expected);
    }

    let result = query.execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// True when a write failed because another connection committed after this
/// transaction's read snapshot was taken (SQLITE_BUSY_SNAPSHOT)
pub fn is_stale_snapshot(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("517"),
        _ => false,
    }
}

/// Look up a technology by its external identifier
pub async fn find_technology(conn: &mut SqliteConnection, tech_id: &str) -> Result<Option<TechnologyRecord>> {
    let sql = format!("SELECT {} FROM technologies WHERE tech_id = ?", TECHNOLOGY_COLUMNS);
    let record = sqlx::query_as::<_, TechnologyRecord>(&sql)
        .bind(tech_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(record)
}

/// Load a technology by internal id
pub async fn get_technology(conn: &mut SqliteConnection, guid: &str) -> Result<TechnologyRecord> {
    let sql = format!("SELECT {} FROM technologies WHERE guid = ?", TECHNOLOGY_COLUMNS);
    let record = sqlx::query_as::<_, TechnologyRecord>(&sql)
        .bind(guid)
        .fetch_one(&mut *conn)
        .await?;

    Ok(record)
}

/// Look up the stage of a technology
pub async fn find_stage(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    technology_guid: &str,
) -> Result<Option<StageRecord>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE technology_guid = ?",
        STAGE_COLUMNS,
        kind.table_name()
    );
    let record = sqlx::query_as::<_, StageRecord>(&sql)
        .bind(technology_guid)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(record)
}

/// Full row (typed columns included) of an entity, keyed by its owning technology
pub async fn fetch_entity_row(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    technology_guid: &str,
) -> Result<Option<SqliteRow>> {
    let key_column = if kind.is_stage() { "technology_guid" } else { "guid" };
    let sql = format!("SELECT * FROM {} WHERE {} = ?", kind.table_name(), key_column);
    let row = sqlx::query(&sql)
        .bind(technology_guid)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row)
}
