//! Database models

use crate::entity::{ColumnKind, EntityKind};
use crate::journal::{AnswerSource, ExtendedData};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Structural columns of a technology (root entity) row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TechnologyRecord {
    /// Internal id
    pub guid: String,
    /// Stable external identifier
    pub tech_id: String,
    pub row_version: i64,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Structural columns of a triage or viability stage row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StageRecord {
    pub guid: String,
    pub technology_guid: String,
    /// Raw extended-data journal
    pub extended_data: Option<String>,
    pub row_version: i64,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl StageRecord {
    /// Decode the stored journal, tagging untagged entries with this stage
    pub fn journal(&self, kind: EntityKind) -> ExtendedData {
        ExtendedData::parse(self.extended_data.as_deref(), AnswerSource::from(kind))
    }
}

/// One stored answer keyed by (technology, question key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnswerRecord {
    pub technology_guid: String,
    pub question_key: String,
    /// JSON-encoded value
    pub value: String,
    pub question_revision_id: Option<String>,
    pub answered_by: String,
    pub answered_at: String,
}

impl AnswerRecord {
    /// Decoded value; text that is not valid JSON is returned as a string
    pub fn value_json(&self) -> Value {
        serde_json::from_str(&self.value).unwrap_or_else(|_| Value::String(self.value.clone()))
    }
}

/// Read an entity's typed columns into a field-name keyed map
///
/// NULL columns are omitted.
pub fn decode_typed_columns(row: &SqliteRow, kind: EntityKind) -> Result<Map<String, Value>> {
    let mut fields = Map::new();

    for field in kind.fields() {
        let value = match field.kind {
            ColumnKind::Text => row.try_get::<Option<String>, _>(field.column)?.map(Value::String),
            ColumnKind::Integer => row.try_get::<Option<i64>, _>(field.column)?.map(Value::from),
            ColumnKind::Real => row
                .try_get::<Option<f64>, _>(field.column)?
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            ColumnKind::Boolean => row
                .try_get::<Option<i64>, _>(field.column)?
                .map(|v| Value::Bool(v != 0)),
            ColumnKind::Json => row
                .try_get::<Option<String>, _>(field.column)?
                .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw))),
        };

        if let Some(value) = value {
            fields.insert(field.field.to_string(), value);
        }
    }

    Ok(fields)
}
