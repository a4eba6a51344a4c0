//! Answer freshness classification
//!
//! Compares the question revision an answer was recorded against with the
//! question's current revision. Used when hydrating a form for editing and
//! when building historical views; never writes.

use crate::binding::BindingMetadata;
use formbind_common::{has_meaningful_value, AnswerSource, VersionedAnswer};
use serde::{Deserialize, Serialize};

/// Freshness of a stored answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerStatus {
    /// No answer, or nothing meaningful in it
    Missing,
    /// Answered against the current revision
    Fresh,
    /// Answered against an older revision of the question
    Stale,
    /// Revision information is absent on either side
    Unknown,
}

/// Classification plus the facts it was based on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerStatusDetail {
    pub status: AnswerStatus,
    pub question_key: String,
    pub saved_revision_id: Option<String>,
    pub current_revision_id: Option<String>,
    pub answered_at: Option<String>,
    pub source: Option<AnswerSource>,
}

/// The parts of a question freshness depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionRevision<'a> {
    pub question_key: &'a str,
    pub current_revision_id: Option<&'a str>,
}

impl<'a> From<&'a BindingMetadata> for QuestionRevision<'a> {
    fn from(binding: &'a BindingMetadata) -> Self {
        Self {
            question_key: &binding.question_key,
            current_revision_id: binding.current_revision_id.as_deref(),
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// Classify an answer against its question's current revision
pub fn get_answer_status(question: QuestionRevision<'_>, answer: Option<&VersionedAnswer>) -> AnswerStatusDetail {
    let current = non_blank(question.current_revision_id);
    let saved = answer.and_then(|a| non_blank(a.revision_id.as_deref()));

    let status = match answer {
        None => AnswerStatus::Missing,
        Some(a) if !has_meaningful_value(&a.value) => AnswerStatus::Missing,
        Some(_) => match (current, saved) {
            (None, _) | (_, None) => AnswerStatus::Unknown,
            (Some(current), Some(saved)) if current == saved => AnswerStatus::Fresh,
            (Some(_), Some(_)) => AnswerStatus::Stale,
        },
    };

    AnswerStatusDetail {
        status,
        question_key: question.question_key.to_string(),
        saved_revision_id: saved.map(str::to_string),
        current_revision_id: current.map(str::to_string),
        answered_at: answer.and_then(|a| a.answered_at.clone()),
        source: answer.and_then(|a| a.source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn question(current: Option<&str>) -> QuestionRevision<'_> {
        QuestionRevision {
            question_key: "triage.impact",
            current_revision_id: current,
        }
    }

    fn answer(value: Value, rev: Option<&str>) -> VersionedAnswer {
        VersionedAnswer::new(value).with_revision(rev.map(str::to_string))
    }

    #[test]
    fn test_missing() {
        assert_eq!(get_answer_status(question(Some("r1")), None).status, AnswerStatus::Missing);
        for empty in [json!(""), json!("  "), json!([]), json!({}), Value::Null] {
            let a = answer(empty, Some("r1"));
            assert_eq!(
                get_answer_status(question(Some("r1")), Some(&a)).status,
                AnswerStatus::Missing
            );
        }
    }

    #[test]
    fn test_unknown_without_revisions() {
        let unattributed = answer(json!("x"), None);
        assert_eq!(
            get_answer_status(question(Some("r1")), Some(&unattributed)).status,
            AnswerStatus::Unknown
        );

        let attributed = answer(json!("x"), Some("r1"));
        assert_eq!(
            get_answer_status(question(None), Some(&attributed)).status,
            AnswerStatus::Unknown
        );
        assert_eq!(
            get_answer_status(question(Some(" ")), Some(&attributed)).status,
            AnswerStatus::Unknown
        );
    }

    #[test]
    fn test_fresh_and_stale() {
        let a = answer(json!(4), Some("r1"));
        let fresh = get_answer_status(question(Some("r1")), Some(&a));
        assert_eq!(fresh.status, AnswerStatus::Fresh);
        assert_eq!(fresh.saved_revision_id.as_deref(), Some("r1"));

        let stale = get_answer_status(question(Some("r2")), Some(&a));
        assert_eq!(stale.status, AnswerStatus::Stale);
        assert_eq!(stale.current_revision_id.as_deref(), Some("r2"));
        assert_eq!(stale.question_key, "triage.impact");
    }

    #[test]
    fn test_detail_carries_answer_metadata() {
        let a = answer(json!("yes"), Some("r1"))
            .answered_at("2025-03-01T12:00:00.000Z")
            .with_source(AnswerSource::AnswerStore);
        let detail = get_answer_status(question(Some("r1")), Some(&a));

        assert_eq!(detail.answered_at.as_deref(), Some("2025-03-01T12:00:00.000Z"));
        assert_eq!(detail.source, Some(AnswerSource::AnswerStore));
        assert_eq!(
            serde_json::to_value(&detail).unwrap()["status"],
            json!("FRESH")
        );
    }
}
