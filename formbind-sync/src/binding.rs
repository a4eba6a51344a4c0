//! Binding metadata resolution
//!
//! Projects a questionnaire definition onto a question-key → binding map.
//! Only questions linked to a data-dictionary entry with a binding path take
//! part in the structured data model; everything else is skipped.

use formbind_common::entity::split_destination_path;
use formbind_common::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Which part of the entity graph a dictionary entry feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSourceCategory {
    Technology,
    TriageStage,
    ViabilityStage,
    Computed,
}

impl DataSourceCategory {
    /// Stage whose extended-data journal tracks answers of this category
    pub fn stage(self) -> Option<EntityKind> {
        match self {
            DataSourceCategory::TriageStage => Some(EntityKind::TriageStage),
            DataSourceCategory::ViabilityStage => Some(EntityKind::ViabilityStage),
            DataSourceCategory::Technology | DataSourceCategory::Computed => None,
        }
    }
}

/// Questionnaire definition as produced by the authoring system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Questionnaire {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    /// Key under which answers are submitted
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Linked dictionary entry; absent when the question is unbound
    #[serde(default)]
    pub dictionary: Option<DictionaryEntry>,
}

/// Data-dictionary entry carrying the binding and revision of a question
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryEntry {
    pub id: String,
    #[serde(default)]
    pub binding_path: Option<String>,
    pub data_source: DataSourceCategory,
    /// Bumped whenever the question changes enough to invalidate answers
    #[serde(default)]
    pub current_revision_id: Option<String>,
    #[serde(default)]
    pub current_version: Option<i64>,
}

/// Resolved binding of one question key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingMetadata {
    pub question_id: String,
    pub question_key: String,
    /// Entity-qualified field path, e.g. `technology.techId`
    pub destination_path: String,
    pub data_source: DataSourceCategory,
    pub dictionary_id: String,
    pub current_revision_id: Option<String>,
    pub current_version: Option<i64>,
}

impl BindingMetadata {
    /// Destination entity and field, when the path names a known entity
    pub fn destination(&self) -> Option<(EntityKind, &str)> {
        split_destination_path(&self.destination_path)
    }
}

/// Bindings keyed by question key
pub type BindingMap = BTreeMap<String, BindingMetadata>;

/// Resolve binding metadata for every dictionary-linked question
///
/// Pure projection: questions without a dictionary entry or binding path
/// are skipped. When two questions share a key the first one wins.
pub fn resolve_bindings(questionnaire: &Questionnaire) -> BindingMap {
    let mut bindings = BindingMap::new();

    for question in questionnaire.sections.iter().flat_map(|s| &s.questions) {
        let Some(dictionary) = &question.dictionary else {
            debug!(question_key = %question.key, "Question not linked to dictionary - skipping");
            continue;
        };

        let Some(path) = dictionary
            .binding_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        else {
            debug!(question_key = %question.key, "Dictionary entry has no binding path - skipping");
            continue;
        };

        if bindings.contains_key(&question.key) {
            warn!(
                question_key = %question.key,
                questionnaire_id = %questionnaire.id,
                "Duplicate question key in questionnaire - keeping first binding"
            );
            continue;
        }

        bindings.insert(
            question.key.clone(),
            BindingMetadata {
                question_id: question.id.clone(),
                question_key: question.key.clone(),
                destination_path: path.to_string(),
                data_source: dictionary.data_source,
                dictionary_id: dictionary.id.clone(),
                current_revision_id: dictionary.current_revision_id.clone(),
                current_version: dictionary.current_version,
            },
        );
    }

    bindings
}
