//! Extended-data journal codec
//!
//! Stage entities carry an `extended_data` JSON column holding a map of
//! question key → versioned answer. Persisted form:
//!
//! ```json
//! { "q1": { "value": "...", "questionRevisionId": "rev-1",
//!           "answeredAt": "2025-01-01T00:00:00Z", "source": "triageStage" } }
//! ```
//!
//! Decoding is lenient: entries written before versioning (bare values, or
//! objects using `revisionId`) are accepted, and null values are dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::entity::EntityKind;
use crate::Result;

/// Where a versioned answer was read from or written by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnswerSource {
    Technology,
    TriageStage,
    ViabilityStage,
    Submission,
    AnswerStore,
}

impl From<EntityKind> for AnswerSource {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Technology => AnswerSource::Technology,
            EntityKind::TriageStage => AnswerSource::TriageStage,
            EntityKind::ViabilityStage => AnswerSource::ViabilityStage,
        }
    }
}

/// One answer tagged with the question revision it was given against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedAnswer {
    pub value: Value,
    /// Revision of the question when the value was written (None for legacy data)
    #[serde(default, rename = "questionRevisionId", alias = "revisionId")]
    pub revision_id: Option<String>,
    /// RFC 3339 timestamp
    #[serde(default)]
    pub answered_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<AnswerSource>,
}

impl VersionedAnswer {
    /// Create an answer with no revision, timestamp or source
    pub fn new(value: Value) -> Self {
        Self {
            value,
            revision_id: None,
            answered_at: None,
            source: None,
        }
    }

    pub fn with_revision(mut self, revision_id: Option<String>) -> Self {
        self.revision_id = revision_id;
        self
    }

    pub fn answered_at(mut self, answered_at: impl Into<String>) -> Self {
        self.answered_at = Some(answered_at.into());
        self
    }

    pub fn with_source(mut self, source: AnswerSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Decode one journal entry, tolerating legacy shapes
    ///
    /// Returns `None` for entries whose value is null.
    fn from_entry(entry: &Value) -> Option<Self> {
        let answer = match entry {
            Value::Object(obj) if obj.contains_key("value") => {
                let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
                VersionedAnswer {
                    value: obj.get("value").cloned().unwrap_or(Value::Null),
                    revision_id: text("questionRevisionId").or_else(|| text("revisionId")),
                    answered_at: text("answeredAt"),
                    source: obj
                        .get("source")
                        .and_then(|s| serde_json::from_value(s.clone()).ok()),
                }
            }
            // Pre-versioning journals stored the bare value
            other => VersionedAnswer::new(other.clone()),
        };

        if answer.value.is_null() {
            None
        } else {
            Some(answer)
        }
    }
}

/// Map of question key → versioned answer stored on a stage entity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExtendedData {
    entries: BTreeMap<String, VersionedAnswer>,
}

impl ExtendedData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a journal from a JSON container
    ///
    /// Entries lacking an explicit source are tagged with `default_source`.
    /// Anything other than a JSON object decodes to an empty journal.
    pub fn from_json(value: &Value, default_source: AnswerSource) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };

        let entries = map
            .iter()
            .filter_map(|(key, entry)| {
                let mut answer = VersionedAnswer::from_entry(entry)?;
                answer.source.get_or_insert(default_source);
                Some((key.clone(), answer))
            })
            .collect();

        Self { entries }
    }

    /// Decode a journal from its stored column text
    ///
    /// Unparseable text is logged and treated as an empty journal so a
    /// corrupt row never blocks new answers from being recorded.
    pub fn parse(raw: Option<&str>, default_source: AnswerSource) -> Self {
        let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
            return Self::default();
        };

        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_json(&value, default_source),
            Err(e) => {
                warn!(error = %e, "Discarding unparseable extended-data journal");
                Self::default()
            }
        }
    }

    /// Encode as a JSON object, or `None` when the journal is empty
    pub fn to_json(&self) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }

        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(key, answer)| Ok((key.clone(), serde_json::to_value(answer)?)))
            .collect::<std::result::Result<_, serde_json::Error>>()
            .ok()?;
        Some(Value::Object(map))
    }

    /// Encode for storage in a TEXT column (`None` stores SQL NULL)
    pub fn to_column(&self) -> Result<Option<String>> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(&self.entries)?))
    }

    pub fn get(&self, key: &str) -> Option<&VersionedAnswer> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, answer: VersionedAnswer) -> Option<VersionedAnswer> {
        self.entries.insert(key.into(), answer)
    }

    pub fn remove(&mut self, key: &str) -> Option<VersionedAnswer> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VersionedAnswer)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_canonical_journal() {
        let raw = r#"{"q1":{"value":"old","questionRevisionId":"rev-1","answeredAt":"2025-01-01T00:00:00Z","source":"triageStage"}}"#;
        let journal = ExtendedData::parse(Some(raw), AnswerSource::ViabilityStage);

        let q1 = journal.get("q1").unwrap();
        assert_eq!(q1.value, json!("old"));
        assert_eq!(q1.revision_id.as_deref(), Some("rev-1"));
        assert_eq!(q1.answered_at.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(q1.source, Some(AnswerSource::TriageStage));
    }

    #[test]
    fn test_parse_legacy_entries() {
        let raw = json!({
            "q1": {"value": "a", "revisionId": "rev-1"},
            "q2": "bare value",
            "q3": {"value": null},
            "q4": null
        });
        let journal = ExtendedData::from_json(&raw, AnswerSource::TriageStage);

        assert_eq!(journal.len(), 2);
        assert_eq!(journal.get("q1").unwrap().revision_id.as_deref(), Some("rev-1"));
        assert_eq!(journal.get("q1").unwrap().source, Some(AnswerSource::TriageStage));

        let q2 = journal.get("q2").unwrap();
        assert_eq!(q2.value, json!("bare value"));
        assert_eq!(q2.revision_id, None);
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(ExtendedData::parse(Some("{not json"), AnswerSource::TriageStage).is_empty());
        assert!(ExtendedData::parse(Some("[1,2]"), AnswerSource::TriageStage).is_empty());
        assert!(ExtendedData::parse(None, AnswerSource::TriageStage).is_empty());
    }

    #[test]
    fn test_encode_uses_canonical_keys() {
        let mut journal = ExtendedData::new();
        journal.insert(
            "q1",
            VersionedAnswer::new(json!("x"))
                .with_revision(Some("rev-2".into()))
                .answered_at("2025-02-01T00:00:00Z")
                .with_source(AnswerSource::ViabilityStage),
        );

        let encoded = journal.to_json().unwrap();
        assert_eq!(
            encoded,
            json!({"q1": {
                "value": "x",
                "questionRevisionId": "rev-2",
                "answeredAt": "2025-02-01T00:00:00Z",
                "source": "viabilityStage"
            }})
        );

        let column = journal.to_column().unwrap().unwrap();
        let reparsed = ExtendedData::parse(Some(&column), AnswerSource::TriageStage);
        assert_eq!(reparsed, journal);
    }

    #[test]
    fn test_empty_journal_encodes_to_none() {
        let journal = ExtendedData::new();
        assert_eq!(journal.to_json(), None);
        assert_eq!(journal.to_column().unwrap(), None);
    }
}
