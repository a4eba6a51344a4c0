//! Entity graph loading and form hydration
//!
//! Reads a technology with its stages and stored answers, then rebuilds the
//! answers a questionnaire should be pre-filled with, each classified for
//! freshness.

use crate::binding::BindingMap;
use crate::db::answers::list_answers;
use crate::db::{fetch_entity_row, find_stage, find_technology};
use crate::error::Result;
use crate::freshness::{get_answer_status, AnswerStatusDetail, QuestionRevision};
use crate::synchronizer::RowVersionSnapshot;
use formbind_common::db::{decode_typed_columns, AnswerRecord};
use formbind_common::{has_meaningful_value, AnswerSource, EntityKind, ExtendedData, VersionedAnswer};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;

/// One stored entity: typed fields plus (for stages) its journal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    pub guid: String,
    pub row_version: i64,
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "ExtendedData::is_empty")]
    pub extended_data: ExtendedData,
}

/// A technology with its stages and answer records
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityGraph {
    pub tech_id: String,
    pub technology: EntitySnapshot,
    pub triage_stage: Option<EntitySnapshot>,
    pub viability_stage: Option<EntitySnapshot>,
    #[serde(skip)]
    pub answers: Vec<AnswerRecord>,
}

impl EntityGraph {
    pub fn stage(&self, kind: EntityKind) -> Option<&EntitySnapshot> {
        match kind {
            EntityKind::Technology => None,
            EntityKind::TriageStage => self.triage_stage.as_ref(),
            EntityKind::ViabilityStage => self.viability_stage.as_ref(),
        }
    }

    /// Current versions, ready to send back as expected versions
    pub fn row_versions(&self) -> RowVersionSnapshot {
        RowVersionSnapshot {
            technology: Some(self.technology.row_version),
            triage_stage: self.triage_stage.as_ref().map(|s| s.row_version),
            viability_stage: self.viability_stage.as_ref().map(|s| s.row_version),
        }
    }

    fn answer_record(&self, question_key: &str) -> Option<&AnswerRecord> {
        self.answers.iter().find(|r| r.question_key == question_key)
    }
}

/// Load a technology graph by external identifier
pub async fn load_entity_graph(conn: &mut SqliteConnection, tech_id: &str) -> Result<Option<EntityGraph>> {
    let Some(technology) = find_technology(conn, tech_id).await? else {
        return Ok(None);
    };

    let technology_fields = match fetch_entity_row(conn, EntityKind::Technology, &technology.guid).await? {
        Some(row) => decode_typed_columns(&row, EntityKind::Technology)?,
        None => Map::new(),
    };

    let mut stages = BTreeMap::new();
    for kind in EntityKind::STAGES {
        let Some(stage) = find_stage(conn, kind, &technology.guid).await? else {
            continue;
        };
        let fields = match fetch_entity_row(conn, kind, &technology.guid).await? {
            Some(row) => decode_typed_columns(&row, kind)?,
            None => Map::new(),
        };
        stages.insert(
            kind.path_segment(),
            EntitySnapshot {
                extended_data: stage.journal(kind),
                guid: stage.guid,
                row_version: stage.row_version,
                fields,
            },
        );
    }

    let answers = list_answers(conn, &technology.guid).await?;

    Ok(Some(EntityGraph {
        tech_id: technology.tech_id,
        technology: EntitySnapshot {
            guid: technology.guid,
            row_version: technology.row_version,
            fields: technology_fields,
            extended_data: ExtendedData::default(),
        },
        triage_stage: stages.remove(EntityKind::TriageStage.path_segment()),
        viability_stage: stages.remove(EntityKind::ViabilityStage.path_segment()),
        answers,
    }))
}

/// A pre-fill answer with its freshness
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HydratedAnswer {
    pub answer: VersionedAnswer,
    pub status: AnswerStatusDetail,
}

/// A form ready for editing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedForm {
    pub tech_id: String,
    pub technology_guid: String,
    pub row_versions: RowVersionSnapshot,
    pub answers: BTreeMap<String, HydratedAnswer>,
}

fn versioned_from_record(record: &AnswerRecord) -> VersionedAnswer {
    VersionedAnswer::new(record.value_json())
        .with_revision(record.question_revision_id.clone())
        .answered_at(record.answered_at.clone())
        .with_source(AnswerSource::AnswerStore)
}

/// Rebuild pre-fill answers from a loaded graph
///
/// Per bound question the answer store wins, then the stage journal, then
/// the typed column (which carries no revision and so classifies as
/// unknown). Stored answers for questions no longer bound are included and
/// classified without a current revision.
pub fn hydrate_answers(graph: &EntityGraph, bindings: &BindingMap) -> BTreeMap<String, HydratedAnswer> {
    let mut hydrated = BTreeMap::new();

    for (key, binding) in bindings {
        let from_store = graph.answer_record(key).map(versioned_from_record);

        let from_journal = || {
            let kind = binding.data_source.stage()?;
            graph.stage(kind)?.extended_data.get(key).cloned()
        };

        let from_column = || {
            let (kind, field) = binding.destination()?;
            let snapshot = match kind {
                EntityKind::Technology => Some(&graph.technology),
                stage => graph.stage(stage),
            }?;
            let value = snapshot.fields.get(field).filter(|v| has_meaningful_value(v))?;
            Some(VersionedAnswer::new(value.clone()).with_source(AnswerSource::from(kind)))
        };

        let Some(answer) = from_store.or_else(from_journal).or_else(from_column) else {
            continue;
        };

        let status = get_answer_status(QuestionRevision::from(binding), Some(&answer));
        hydrated.insert(key.clone(), HydratedAnswer { answer, status });
    }

    for record in &graph.answers {
        if bindings.contains_key(&record.question_key) {
            continue;
        }

        debug!(question_key = %record.question_key, "Stored answer for unbound question");
        let answer = versioned_from_record(record);
        let question = QuestionRevision {
            question_key: &record.question_key,
            current_revision_id: None,
        };
        let status = get_answer_status(question, Some(&answer));
        hydrated.insert(record.question_key.clone(), HydratedAnswer { answer, status });
    }

    hydrated
}

/// Load a technology and hydrate its form; `None` if it doesn't exist
pub async fn hydrate(pool: &SqlitePool, bindings: &BindingMap, tech_id: &str) -> Result<Option<HydratedForm>> {
    let mut conn = pool.acquire().await?;
    let Some(graph) = load_entity_graph(&mut conn, tech_id).await? else {
        return Ok(None);
    };

    let answers = hydrate_answers(&graph, bindings);
    debug!(tech_id = %tech_id, answers = answers.len(), "Hydrated form");

    Ok(Some(HydratedForm {
        row_versions: graph.row_versions(),
        tech_id: graph.tech_id,
        technology_guid: graph.technology.guid,
        answers,
    }))
}
