//! Entity synchronizer
//!
//! Projects one submission onto the entity graph inside a single
//! transaction:
//!
//! 1. Extract bound values and split them by destination entity
//! 2. Find the technology by its external identifier, or create it when
//!    the minimum required fields are present
//! 3. Update the technology, then each stage, under optimistic concurrency
//!    control when the caller supplies expected row versions
//! 4. Merge stage journals (update-or-delete-by-null)
//! 5. Upsert one answer record per meaningful answer
//!
//! A version mismatch raises `SyncError::LockConflict`; the caller's
//! transaction must then be rolled back. Retrying with fresh versions is the
//! caller's job.

use crate::answer_store::write_answer_records;
use crate::binding::BindingMap;
use crate::db::{
    find_stage, find_technology, get_technology, insert_entity, is_stale_snapshot, update_entity, RowWrite,
    WriteStamp,
};
use crate::error::{Result, SyncError};
use crate::extract::{
    build_extended_data_updates_at, extract_bound_values, partition_by_destination, Answers,
    FieldValues, JournalUpdates,
};
use crate::patch::{apply_extended_data_patch, JournalPatch};
use chrono::{SecondsFormat, Utc};
use formbind_common::config::SyncConfig;
use formbind_common::db::TechnologyRecord;
use formbind_common::entity::{SqlValue, TECH_ID_FIELD};
use formbind_common::{has_meaningful_value, AnswerSource, EntityKind};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Row versions of the technology and its stages
///
/// As input: the versions the caller last observed (absent = don't check).
/// As output: the versions after the write (absent = entity doesn't exist).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowVersionSnapshot {
    #[serde(rename = "technologyRowVersion", default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<i64>,
    #[serde(rename = "triageStageRowVersion", default, skip_serializing_if = "Option::is_none")]
    pub triage_stage: Option<i64>,
    #[serde(rename = "viabilityStageRowVersion", default, skip_serializing_if = "Option::is_none")]
    pub viability_stage: Option<i64>,
}

impl RowVersionSnapshot {
    pub fn get(&self, kind: EntityKind) -> Option<i64> {
        match kind {
            EntityKind::Technology => self.technology,
            EntityKind::TriageStage => self.triage_stage,
            EntityKind::ViabilityStage => self.viability_stage,
        }
    }

    pub fn set(&mut self, kind: EntityKind, version: Option<i64>) {
        match kind {
            EntityKind::Technology => self.technology = version,
            EntityKind::TriageStage => self.triage_stage = version,
            EntityKind::ViabilityStage => self.viability_stage = version,
        }
    }
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Actor recorded on writes; blank or absent uses the configured fallback
    pub actor_id: Option<String>,
    /// Explicit submit (`true`) raises on missing required fields; draft
    /// save (`false`) silently skips creation
    pub allow_create_when_incomplete: bool,
    pub expected_versions: Option<RowVersionSnapshot>,
}

/// Result of applying a submission; empty when nothing could be routed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technology_guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_versions: Option<RowVersionSnapshot>,
}

impl SyncOutcome {
    /// True for the silent no-op result
    pub fn is_empty(&self) -> bool {
        self.technology_guid.is_none()
    }
}

/// Binding-aware writer of submissions onto the entity graph
#[derive(Debug, Clone)]
pub struct EntitySynchronizer {
    config: SyncConfig,
}

impl EntitySynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    /// Apply a submission in its own transaction
    ///
    /// The transaction takes the write lock up front (`BEGIN IMMEDIATE`), so
    /// concurrent submissions serialize and the loser sees the winner's row
    /// versions. Commits on success. On any error the transaction is rolled
    /// back and nothing from this call is persisted.
    pub async fn submit(
        &self,
        pool: &SqlitePool,
        bindings: &BindingMap,
        answers: &Answers,
        options: &ApplyOptions,
    ) -> Result<SyncOutcome> {
        let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

        match self.apply_binding_writes(&mut tx, bindings, answers, options).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if e.is_lock_conflict() {
                    warn!(error = %e, "Submission rejected - rolling back");
                }
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Apply a submission inside the caller's transaction
    ///
    /// A deferred transaction whose read snapshot went stale before its first
    /// write fails with `LockConflict` as well.
    pub async fn apply_binding_writes(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        bindings: &BindingMap,
        answers: &Answers,
        options: &ApplyOptions,
    ) -> Result<SyncOutcome> {
        let conn: &mut SqliteConnection = &mut **tx;
        let now = Utc::now();

        let values = extract_bound_values(bindings, answers);
        let partitioned = partition_by_destination(&values);
        let journal_updates = build_extended_data_updates_at(bindings, answers, now);

        let Some(tech_id) = partitioned.tech_id() else {
            debug!("Submission has no technology identifier - nothing to route");
            return Ok(SyncOutcome::default());
        };

        let actor = self.config.resolve_actor(options.actor_id.as_deref());
        let at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let stamp = WriteStamp { actor: &actor, at: &at };
        let expected = options.expected_versions.unwrap_or_default();

        let technology_write = build_row_write(EntityKind::Technology, &partitioned.technology);

        let technology = match find_technology(conn, &tech_id).await? {
            Some(existing) => {
                self.update_technology(conn, existing, &technology_write, expected.technology, stamp)
                    .await?
            }
            None => {
                let missing = self.missing_required_fields(&partitioned.technology);
                if !missing.is_empty() {
                    if options.allow_create_when_incomplete {
                        return Err(SyncError::MissingRequiredFields { tech_id, missing });
                    }
                    debug!(
                        tech_id = %tech_id,
                        missing = ?missing,
                        "Draft save without required fields - technology not created"
                    );
                    return Ok(SyncOutcome::default());
                }

                self.create_technology(conn, &tech_id, technology_write, stamp).await?
            }
        };

        let mut versions = RowVersionSnapshot {
            technology: Some(technology.row_version),
            ..Default::default()
        };

        for stage in EntityKind::STAGES {
            let empty = JournalUpdates::new();
            let version = sync_stage(
                conn,
                stage,
                &technology.guid,
                partitioned.get(stage),
                journal_updates.get(stage).unwrap_or(&empty),
                expected.get(stage),
                stamp,
            )
            .await?;
            versions.set(stage, version);
        }

        let answers_written = write_answer_records(conn, &technology.guid, bindings, answers, stamp).await?;

        info!(
            tech_id = %tech_id,
            technology_guid = %technology.guid,
            actor = %actor,
            technology_version = ?versions.technology,
            triage_version = ?versions.triage_stage,
            viability_version = ?versions.viability_stage,
            answers_written,
            "Applied binding writes"
        );

        Ok(SyncOutcome {
            technology_guid: Some(technology.guid),
            tech_id: Some(tech_id),
            row_versions: Some(versions),
        })
    }

    async fn update_technology(
        &self,
        conn: &mut SqliteConnection,
        existing: TechnologyRecord,
        write: &RowWrite,
        expected_version: Option<i64>,
        stamp: WriteStamp<'_>,
    ) -> Result<TechnologyRecord> {
        if write.is_empty() {
            if let Some(expected) = expected_version.filter(|v| *v != existing.row_version) {
                return Err(SyncError::LockConflict {
                    entity: EntityKind::Technology,
                    entity_id: existing.tech_id,
                    expected_version: expected,
                });
            }
            debug!(tech_id = %existing.tech_id, "No technology fields to update");
            return Ok(existing);
        }

        guarded_update(
            conn,
            EntityKind::Technology,
            &existing.guid,
            &existing.tech_id,
            write,
            expected_version.unwrap_or(existing.row_version),
            expected_version.is_some(),
            stamp,
        )
        .await?;

        // Reload for the authoritative version
        get_technology(conn, &existing.guid).await
    }

    async fn create_technology(
        &self,
        conn: &mut SqliteConnection,
        tech_id: &str,
        mut write: RowWrite,
        stamp: WriteStamp<'_>,
    ) -> Result<TechnologyRecord> {
        let guid = Uuid::new_v4().to_string();
        write.set("tech_id", SqlValue::Text(tech_id.to_string()));

        insert_entity(conn, EntityKind::Technology, &guid, &write, stamp).await?;
        info!(tech_id = %tech_id, technology_guid = %guid, "Created technology");

        get_technology(conn, &guid).await
    }

    /// Required fields (in configured order) without meaningful values
    fn missing_required_fields(&self, fields: &FieldValues) -> Vec<String> {
        self.config
            .required_technology_fields
            .iter()
            .filter(|name| name.as_str() != TECH_ID_FIELD)
            .filter(|name| !fields.get(name.as_str()).is_some_and(has_meaningful_value))
            .cloned()
            .collect()
    }
}

/// Upsert one stage: typed columns plus merged journal
///
/// Returns the stage's row version after the write, or `None` if the stage
/// does not exist and nothing warranted creating it.
async fn sync_stage(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    technology_guid: &str,
    fields: &FieldValues,
    updates: &JournalUpdates,
    expected_version: Option<i64>,
    stamp: WriteStamp<'_>,
) -> Result<Option<i64>> {
    let mut write = build_row_write(kind, fields);
    let existing = find_stage(conn, kind, technology_guid).await?;

    if write.is_empty() && updates.is_empty() {
        if let (Some(stage), Some(expected)) = (&existing, expected_version) {
            if stage.row_version != expected {
                return Err(SyncError::LockConflict {
                    entity: kind,
                    entity_id: stage.guid.clone(),
                    expected_version: expected,
                });
            }
        }
        return Ok(existing.map(|s| s.row_version));
    }

    let source = AnswerSource::from(kind);

    let Some(existing) = existing else {
        // Nothing to clear on a row that doesn't exist yet
        write.columns.retain(|(_, value)| *value != SqlValue::Null);

        let patch = apply_extended_data_patch(None, updates, source);
        if let JournalPatch::Replace(journal) = &patch {
            write.set("extended_data", SqlValue::Text(journal.to_string()));
        }
        if write.is_empty() {
            debug!(stage = %kind, "Only removals for a stage that doesn't exist - skipping");
            return Ok(None);
        }

        let guid = Uuid::new_v4().to_string();
        write.set("technology_guid", SqlValue::Text(technology_guid.to_string()));
        insert_entity(conn, kind, &guid, &write, stamp).await?;
        info!(stage = %kind, stage_guid = %guid, "Created stage");
        return Ok(Some(1));
    };

    let stored_journal = existing.journal(kind).to_json();
    let patch = apply_extended_data_patch(stored_journal.as_ref(), updates, source);
    if let Some(column) = patch.column_value() {
        write.set("extended_data", column.map(SqlValue::Text).unwrap_or(SqlValue::Null));
    }

    guarded_update(
        conn,
        kind,
        &existing.guid,
        &existing.guid,
        &write,
        expected_version.unwrap_or(existing.row_version),
        expected_version.is_some(),
        stamp,
    )
    .await?;

    let reloaded = find_stage(conn, kind, technology_guid).await?;
    Ok(reloaded.map(|s| s.row_version))
}

/// Update an entity row, turning a lost race into `LockConflict`
///
/// A race is lost when the version check matches no row, or when SQLite
/// refuses the write because another connection committed after this
/// transaction's snapshot.
#[allow(clippy::too_many_arguments)]
async fn guarded_update(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    guid: &str,
    entity_id: &str,
    write: &RowWrite,
    version: i64,
    check_version: bool,
    stamp: WriteStamp<'_>,
) -> Result<()> {
    let conflict = || SyncError::LockConflict {
        entity: kind,
        entity_id: entity_id.to_string(),
        expected_version: version,
    };

    let expected_version = check_version.then_some(version);
    match update_entity(conn, kind, guid, write, expected_version, stamp).await {
        Ok(0) => Err(conflict()),
        Ok(_) => Ok(()),
        Err(SyncError::Database(e)) if is_stale_snapshot(&e) => {
            debug!(entity = %kind, entity_id = %entity_id, error = %e, "Write lost to a concurrent commit");
            Err(conflict())
        }
        Err(e) => Err(e),
    }
}

/// Map routed field values onto typed-column assignments
///
/// The technology identifier is never part of an update. Fields without a
/// typed column are left to the journal; values that cannot be coerced are
/// skipped so stored data is not clobbered by bad input.
fn build_row_write(kind: EntityKind, fields: &FieldValues) -> RowWrite {
    let mut write = RowWrite::default();

    for (name, value) in fields {
        if kind == EntityKind::Technology && name == TECH_ID_FIELD {
            continue;
        }

        let Some(column) = kind.field(name) else {
            debug!(entity = %kind, field = %name, "No typed column for field");
            continue;
        };

        match column.kind.coerce(value) {
            Some(sql_value) => write.set(column.column, sql_value),
            None => warn!(
                entity = %kind,
                field = %name,
                value = %value,
                "Value does not fit column type - skipped"
            ),
        }
    }

    write
}
