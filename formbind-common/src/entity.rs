//! Entity graph registry
//!
//! One `Technology` root entity owns at most one `TriageStage` and one
//! `ViabilityStage`. Each entity declares the fields that have typed columns;
//! this registry is the single source of truth for destination routing,
//! typed-column writes and the table schemas synced on startup.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::value::has_meaningful_value;

/// Field name of the technology's stable external identifier
pub const TECH_ID_FIELD: &str = "techId";

/// Destination entity of a bound answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Technology,
    TriageStage,
    ViabilityStage,
}

impl EntityKind {
    /// All entities, root first (write order)
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Technology,
        EntityKind::TriageStage,
        EntityKind::ViabilityStage,
    ];

    /// Dependent stage entities
    pub const STAGES: [EntityKind; 2] = [EntityKind::TriageStage, EntityKind::ViabilityStage];

    /// First segment of a destination path routed to this entity
    pub fn path_segment(self) -> &'static str {
        match self {
            EntityKind::Technology => "technology",
            EntityKind::TriageStage => "triageStage",
            EntityKind::ViabilityStage => "viabilityStage",
        }
    }

    /// Resolve a destination path segment to an entity
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.path_segment() == segment)
    }

    /// Database table backing this entity
    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::Technology => "technologies",
            EntityKind::TriageStage => "triage_stages",
            EntityKind::ViabilityStage => "viability_stages",
        }
    }

    pub fn is_stage(self) -> bool {
        !matches!(self, EntityKind::Technology)
    }

    /// Fields with typed columns on this entity
    pub fn fields(self) -> &'static [FieldColumn] {
        match self {
            EntityKind::Technology => TECHNOLOGY_FIELDS,
            EntityKind::TriageStage => TRIAGE_STAGE_FIELDS,
            EntityKind::ViabilityStage => VIABILITY_STAGE_FIELDS,
        }
    }

    /// Look up the typed column for a field name
    pub fn field(self, name: &str) -> Option<&'static FieldColumn> {
        self.fields().iter().find(|f| f.field == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Split an entity-qualified destination path (`"technology.techId"`)
///
/// Returns `None` when the first segment is not a known entity or the field
/// part is empty.
pub fn split_destination_path(path: &str) -> Option<(EntityKind, &str)> {
    let (segment, field) = path.split_once('.')?;
    let kind = EntityKind::from_path_segment(segment.trim())?;
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    Some((kind, field))
}

/// Storage kind of a typed column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    Boolean,
    Json,
}

impl ColumnKind {
    /// SQLite column type
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Text | ColumnKind::Json => "TEXT",
            ColumnKind::Integer | ColumnKind::Boolean => "INTEGER",
            ColumnKind::Real => "REAL",
        }
    }

    /// Coerce a submitted JSON value into a column value
    ///
    /// Values without meaningful content become `SqlValue::Null`. Returns
    /// `None` when a meaningful value cannot be represented in this column.
    pub fn coerce(self, value: &Value) -> Option<SqlValue> {
        if !has_meaningful_value(value) {
            return Some(SqlValue::Null);
        }

        match self {
            ColumnKind::Text => Some(SqlValue::Text(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
            ColumnKind::Json => Some(SqlValue::Text(value.to_string())),
            ColumnKind::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().and_then(round_to_i64))
                    .map(SqlValue::Integer),
                Value::String(s) => {
                    let s = s.trim();
                    s.parse::<i64>()
                        .ok()
                        .or_else(|| s.parse::<f64>().ok().and_then(round_to_i64))
                        .map(SqlValue::Integer)
                }
                Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
                _ => None,
            },
            ColumnKind::Real => match value {
                Value::Number(n) => n.as_f64().map(SqlValue::Real),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(SqlValue::Real),
                _ => None,
            },
            ColumnKind::Boolean => match value {
                Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Some(SqlValue::Integer(0)),
                    Some(1) => Some(SqlValue::Integer(1)),
                    _ => None,
                },
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "1" => Some(SqlValue::Integer(1)),
                    "false" | "no" | "0" => Some(SqlValue::Integer(0)),
                    _ => None,
                },
                _ => None,
            },
        }
    }
}

/// Round to the nearest integer; `None` when outside the i64 range
fn round_to_i64(f: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    let rounded = f.round();
    (rounded.is_finite() && rounded >= -LIMIT && rounded < LIMIT).then_some(rounded as i64)
}

/// Column value ready to bind into a query
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
}

/// Typed column backing one entity field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldColumn {
    /// Field name used in destination paths
    pub field: &'static str,
    /// Column name in the entity table
    pub column: &'static str,
    pub kind: ColumnKind,
}

const fn col(field: &'static str, column: &'static str, kind: ColumnKind) -> FieldColumn {
    FieldColumn { field, column, kind }
}

static TECHNOLOGY_FIELDS: &[FieldColumn] = &[
    col(TECH_ID_FIELD, "tech_id", ColumnKind::Text),
    col("technologyName", "technology_name", ColumnKind::Text),
    col("shortDescription", "short_description", ColumnKind::Text),
    col("inventorName", "inventor_name", ColumnKind::Text),
    col("inventorTitle", "inventor_title", ColumnKind::Text),
    col("inventorDepartment", "inventor_department", ColumnKind::Text),
    col("reviewerName", "reviewer_name", ColumnKind::Text),
    col("campus", "campus", ColumnKind::Text),
    col("disclosureDate", "disclosure_date", ColumnKind::Text),
    col("keywords", "keywords", ColumnKind::Json),
    col("patentFiled", "patent_filed", ColumnKind::Boolean),
];

static TRIAGE_STAGE_FIELDS: &[FieldColumn] = &[
    col("reviewer", "reviewer", ColumnKind::Text),
    col("technologyOverview", "technology_overview", ColumnKind::Text),
    col("missionAlignmentScore", "mission_alignment_score", ColumnKind::Integer),
    col("unmetNeedScore", "unmet_need_score", ColumnKind::Integer),
    col("stateOfArtScore", "state_of_art_score", ColumnKind::Integer),
    col("marketScore", "market_score", ColumnKind::Integer),
    col("impactScore", "impact_score", ColumnKind::Real),
    col("valueScore", "value_score", ColumnKind::Real),
    col("recommendation", "recommendation", ColumnKind::Text),
    col("recommendationNotes", "recommendation_notes", ColumnKind::Text),
];

static VIABILITY_STAGE_FIELDS: &[FieldColumn] = &[
    col("technicalFeasibility", "technical_feasibility", ColumnKind::Text),
    col("commercialPathway", "commercial_pathway", ColumnKind::Text),
    col("marketSizeEstimate", "market_size_estimate", ColumnKind::Real),
    col("licensingInterest", "licensing_interest", ColumnKind::Boolean),
    col("viabilityScore", "viability_score", ColumnKind::Real),
    col("recommendation", "recommendation", ColumnKind::Text),
    col("notes", "notes", ColumnKind::Text),
];
