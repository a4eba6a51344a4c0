//! Value extraction and partitioning
//!
//! Turns a flat answer map into per-entity field values and per-stage
//! journal updates. All functions are total: missing keys are skipped,
//! never errors.

use crate::binding::BindingMap;
use chrono::{DateTime, SecondsFormat, Utc};
use formbind_common::entity::{split_destination_path, TECH_ID_FIELD};
use formbind_common::value::value_to_text;
use formbind_common::{has_meaningful_value, EntityKind, VersionedAnswer};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Flat answer map as submitted: question key → value
pub type Answers = BTreeMap<String, Value>;

/// Field name → value for one entity
pub type FieldValues = BTreeMap<String, Value>;

/// Journal changes for one stage: `None` removes the key
pub type JournalUpdates = BTreeMap<String, Option<VersionedAnswer>>;

/// Copy every bound answer under its destination path
///
/// Answers without a binding are dropped (they are handled elsewhere, e.g.
/// computed scores). Keys without an answer produce nothing.
pub fn extract_bound_values(bindings: &BindingMap, answers: &Answers) -> BTreeMap<String, Value> {
    let mut values = BTreeMap::new();

    for (key, binding) in bindings {
        let Some(value) = answers.get(key) else {
            continue;
        };

        if let Some(previous) = values.insert(binding.destination_path.clone(), value.clone()) {
            if &previous != value {
                warn!(
                    destination = %binding.destination_path,
                    question_key = %key,
                    "Several questions bound to the same destination - last one wins"
                );
            }
        }
    }

    values
}

/// Destination values split by entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionedValues {
    pub technology: FieldValues,
    pub triage_stage: FieldValues,
    pub viability_stage: FieldValues,
}

impl PartitionedValues {
    pub fn get(&self, kind: EntityKind) -> &FieldValues {
        match kind {
            EntityKind::Technology => &self.technology,
            EntityKind::TriageStage => &self.triage_stage,
            EntityKind::ViabilityStage => &self.viability_stage,
        }
    }

    fn get_mut(&mut self, kind: EntityKind) -> &mut FieldValues {
        match kind {
            EntityKind::Technology => &mut self.technology,
            EntityKind::TriageStage => &mut self.triage_stage,
            EntityKind::ViabilityStage => &mut self.viability_stage,
        }
    }

    /// Usable external identifier from the technology partition
    pub fn tech_id(&self) -> Option<String> {
        self.technology
            .get(TECH_ID_FIELD)
            .filter(|v| has_meaningful_value(v))
            .filter(|v| matches!(v, Value::String(_) | Value::Number(_)))
            .and_then(value_to_text)
            .map(|s| s.trim().to_string())
    }
}

/// Split a destination-path map by its entity segment
///
/// Paths whose first segment is not a known entity are dropped.
pub fn partition_by_destination(values: &BTreeMap<String, Value>) -> PartitionedValues {
    let mut partitioned = PartitionedValues::default();

    for (path, value) in values {
        match split_destination_path(path) {
            Some((kind, field)) => {
                partitioned.get_mut(kind).insert(field.to_string(), value.clone());
            }
            None => debug!(destination = %path, "Unroutable destination path - dropped"),
        }
    }

    partitioned
}

/// Pending journal changes for both stages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtendedDataUpdates {
    pub triage_stage: JournalUpdates,
    pub viability_stage: JournalUpdates,
}

impl ExtendedDataUpdates {
    /// Updates for a stage; the technology has no journal
    pub fn get(&self, kind: EntityKind) -> Option<&JournalUpdates> {
        match kind {
            EntityKind::Technology => None,
            EntityKind::TriageStage => Some(&self.triage_stage),
            EntityKind::ViabilityStage => Some(&self.viability_stage),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triage_stage.is_empty() && self.viability_stage.is_empty()
    }
}

/// Build journal updates for every stage-sourced answer, stamped now
pub fn build_extended_data_updates(bindings: &BindingMap, answers: &Answers) -> ExtendedDataUpdates {
    build_extended_data_updates_at(bindings, answers, Utc::now())
}

/// Build journal updates with an explicit timestamp
///
/// Meaningful values become versioned answers carrying the question's
/// current revision; empty values become `None` (remove from journal).
pub fn build_extended_data_updates_at(
    bindings: &BindingMap,
    answers: &Answers,
    now: DateTime<Utc>,
) -> ExtendedDataUpdates {
    let answered_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut updates = ExtendedDataUpdates::default();

    for (key, binding) in bindings {
        let Some(stage) = binding.data_source.stage() else {
            continue;
        };
        let Some(value) = answers.get(key) else {
            continue;
        };

        let update = has_meaningful_value(value).then(|| {
            VersionedAnswer::new(value.clone())
                .with_revision(binding.current_revision_id.clone())
                .answered_at(answered_at.clone())
        });

        let target = match stage {
            EntityKind::TriageStage => &mut updates.triage_stage,
            EntityKind::ViabilityStage => &mut updates.viability_stage,
            EntityKind::Technology => continue,
        };
        target.insert(key.clone(), update);
    }

    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindingMetadata, DataSourceCategory};
    use chrono::TimeZone;
    use serde_json::json;

    fn binding(key: &str, path: &str, source: DataSourceCategory, rev: Option<&str>) -> (String, BindingMetadata) {
        (
            key.to_string(),
            BindingMetadata {
                question_id: format!("id-{}", key),
                question_key: key.to_string(),
                destination_path: path.to_string(),
                data_source: source,
                dictionary_id: format!("dict-{}", key),
                current_revision_id: rev.map(str::to_string),
                current_version: None,
            },
        )
    }

    fn bindings() -> BindingMap {
        [
            binding("tech.techId", "technology.techId", DataSourceCategory::Technology, Some("r1")),
            binding("tech.name", "technology.technologyName", DataSourceCategory::Technology, Some("r1")),
            binding("triage.impact", "triageStage.impactScore", DataSourceCategory::TriageStage, Some("r7")),
            binding("triage.extra", "triageStage.freeText", DataSourceCategory::TriageStage, None),
            binding("via.notes", "viabilityStage.notes", DataSourceCategory::ViabilityStage, Some("r2")),
            binding("legacy.thing", "archive.thing", DataSourceCategory::Computed, None),
        ]
        .into_iter()
        .collect()
    }

    fn answers(value: Value) -> Answers {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_extract_only_bound_and_present() {
        let answers = answers(json!({
            "tech.techId": "D25-0001",
            "triage.impact": 4,
            "unbound.key": "dropped"
        }));

        let values = extract_bound_values(&bindings(), &answers);

        assert_eq!(values.len(), 2);
        assert_eq!(values["technology.techId"], json!("D25-0001"));
        assert_eq!(values["triageStage.impactScore"], json!(4));
        for binding in bindings().values() {
            if values.contains_key(&binding.destination_path) {
                assert!(answers.contains_key(&binding.question_key));
            }
        }
    }

    #[test]
    fn test_partition_by_destination() {
        let values: BTreeMap<String, Value> = [
            ("technology.techId".to_string(), json!("D25-0001")),
            ("triageStage.impactScore".to_string(), json!(4)),
            ("viabilityStage.notes".to_string(), json!("ok")),
            ("archive.thing".to_string(), json!(1)),
            ("noSegment".to_string(), json!(2)),
        ]
        .into_iter()
        .collect();

        let partitioned = partition_by_destination(&values);

        assert_eq!(partitioned.technology.len(), 1);
        assert_eq!(partitioned.triage_stage["impactScore"], json!(4));
        assert_eq!(partitioned.viability_stage["notes"], json!("ok"));
        assert_eq!(partitioned.tech_id().as_deref(), Some("D25-0001"));
    }

    #[test]
    fn test_tech_id_requires_usable_value() {
        let mut partitioned = PartitionedValues::default();
        assert_eq!(partitioned.tech_id(), None);

        partitioned.technology.insert("techId".into(), json!("   "));
        assert_eq!(partitioned.tech_id(), None);

        partitioned.technology.insert("techId".into(), json!(["D25"]));
        assert_eq!(partitioned.tech_id(), None);

        partitioned.technology.insert("techId".into(), json!(" D25-0002 "));
        assert_eq!(partitioned.tech_id().as_deref(), Some("D25-0002"));
    }

    #[test]
    fn test_build_extended_data_updates() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let answers = answers(json!({
            "tech.name": "Widget",
            "triage.impact": 4,
            "triage.extra": "  ",
            "via.notes": "promising"
        }));

        let updates = build_extended_data_updates_at(&bindings(), &answers, now);

        assert_eq!(updates.triage_stage.len(), 2);
        let impact = updates.triage_stage["triage.impact"].as_ref().unwrap();
        assert_eq!(impact.value, json!(4));
        assert_eq!(impact.revision_id.as_deref(), Some("r7"));
        assert_eq!(impact.answered_at.as_deref(), Some("2025-03-01T12:00:00.000Z"));
        assert_eq!(impact.source, None);

        // Empty answer is an explicit removal
        assert_eq!(updates.triage_stage["triage.extra"], None);

        let notes = updates.viability_stage["via.notes"].as_ref().unwrap();
        assert_eq!(notes.revision_id.as_deref(), Some("r2"));

        // Technology-sourced answers never touch a journal
        assert!(updates.get(EntityKind::Technology).is_none());
    }

    #[test]
    fn test_no_stage_answers_no_updates() {
        let answers = answers(json!({ "tech.techId": "D25-0001" }));
        assert!(build_extended_data_updates(&bindings(), &answers).is_empty());
    }
}
