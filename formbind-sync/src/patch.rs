//! Extended-data merge patching
//!
//! Update-or-delete-by-null merge over a stage journal. Keys absent from the
//! update set are preserved, so answers to questions that are still asked
//! survive edits that don't touch them, while a `None` update lets an
//! answer age out.

use crate::extract::JournalUpdates;
use formbind_common::{AnswerSource, ExtendedData};
use serde_json::Value;

/// Result of patching a journal
#[derive(Debug, Clone, PartialEq)]
pub enum JournalPatch {
    /// No updates were supplied; leave the stored journal alone
    Unchanged,
    /// The journal ended up empty; store NULL
    Clear,
    /// New journal to store
    Replace(Value),
}

impl JournalPatch {
    /// Column text to write, or `None` when nothing should be written
    pub fn column_value(&self) -> Option<Option<String>> {
        match self {
            JournalPatch::Unchanged => None,
            JournalPatch::Clear => Some(None),
            JournalPatch::Replace(value) => Some(Some(value.to_string())),
        }
    }
}

/// Merge journal updates into an existing journal
///
/// Entries of the existing journal without a source are tagged with
/// `default_source`. An update without a source inherits the source of the
/// entry it replaces (or `default_source` for a new key).
pub fn apply_extended_data_patch(
    existing: Option<&Value>,
    updates: &JournalUpdates,
    default_source: AnswerSource,
) -> JournalPatch {
    if updates.is_empty() {
        return JournalPatch::Unchanged;
    }

    let mut journal = existing
        .map(|value| ExtendedData::from_json(value, default_source))
        .unwrap_or_default();

    for (key, update) in updates {
        match update {
            None => {
                journal.remove(key);
            }
            Some(answer) => {
                let mut answer = answer.clone();
                if answer.source.is_none() {
                    answer.source = journal
                        .get(key)
                        .and_then(|prior| prior.source)
                        .or(Some(default_source));
                }
                journal.insert(key.clone(), answer);
            }
        }
    }

    match journal.to_json() {
        Some(value) => JournalPatch::Replace(value),
        None => JournalPatch::Clear,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formbind_common::VersionedAnswer;
    use serde_json::json;

    fn answer(value: &str, rev: &str) -> Option<VersionedAnswer> {
        Some(
            VersionedAnswer::new(json!(value))
                .with_revision(Some(rev.to_string()))
                .answered_at("2025-03-01T12:00:00.000Z"),
        )
    }

    fn updates(entries: Vec<(&str, Option<VersionedAnswer>)>) -> JournalUpdates {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_no_updates_is_unchanged() {
        let existing = json!({"q1": {"value": "old"}});
        let patch = apply_extended_data_patch(Some(&existing), &JournalUpdates::new(), AnswerSource::TriageStage);
        assert_eq!(patch, JournalPatch::Unchanged);
        assert_eq!(patch.column_value(), None);
    }

    #[test]
    fn test_replace_and_add_preserves_untouched_keys() {
        let existing = json!({
            "q1": {"value": "old", "questionRevisionId": "rev-1"},
            "q9": {"value": "keep", "questionRevisionId": "rev-0", "source": "submission"}
        });
        let patch = apply_extended_data_patch(
            Some(&existing),
            &updates(vec![("q1", answer("new", "rev-1")), ("q2", answer("x", "rev-2"))]),
            AnswerSource::TriageStage,
        );

        let JournalPatch::Replace(journal) = patch else {
            panic!("expected Replace, got {:?}", patch);
        };
        assert_eq!(journal["q1"]["value"], json!("new"));
        assert_eq!(journal["q1"]["source"], json!("triageStage"));
        assert_eq!(journal["q2"]["questionRevisionId"], json!("rev-2"));
        assert_eq!(journal["q9"]["value"], json!("keep"));
        assert_eq!(journal["q9"]["source"], json!("submission"));
    }

    #[test]
    fn test_update_inherits_prior_source() {
        let existing = json!({"q1": {"value": "old", "source": "answerStore"}});
        let patch = apply_extended_data_patch(
            Some(&existing),
            &updates(vec![("q1", answer("new", "rev-3"))]),
            AnswerSource::TriageStage,
        );

        let JournalPatch::Replace(journal) = patch else {
            panic!("expected Replace");
        };
        assert_eq!(journal["q1"]["source"], json!("answerStore"));
    }

    #[test]
    fn test_null_update_removes_key() {
        let existing = json!({"q1": {"value": "old"}, "q2": {"value": "stay"}});
        let patch = apply_extended_data_patch(
            Some(&existing),
            &updates(vec![("q1", None), ("never-there", None)]),
            AnswerSource::ViabilityStage,
        );

        let JournalPatch::Replace(journal) = patch else {
            panic!("expected Replace");
        };
        assert!(journal.get("q1").is_none());
        assert!(journal.get("never-there").is_none());
        assert_eq!(journal["q2"]["value"], json!("stay"));
    }

    #[test]
    fn test_removing_last_key_clears_journal() {
        let existing = json!({"q1": {"value": "old"}});
        let patch = apply_extended_data_patch(
            Some(&existing),
            &updates(vec![("q1", None)]),
            AnswerSource::TriageStage,
        );
        assert_eq!(patch, JournalPatch::Clear);
        assert_eq!(patch.column_value(), Some(None));

        let from_nothing = apply_extended_data_patch(None, &updates(vec![("q1", None)]), AnswerSource::TriageStage);
        assert_eq!(from_nothing, JournalPatch::Clear);
    }

    #[test]
    fn test_patch_is_idempotent() {
        let existing = json!({"q1": {"value": "old", "questionRevisionId": "rev-1"}});
        let delta = updates(vec![("q1", answer("new", "rev-1")), ("q2", None)]);

        let JournalPatch::Replace(once) = apply_extended_data_patch(Some(&existing), &delta, AnswerSource::TriageStage)
        else {
            panic!("expected Replace");
        };
        let JournalPatch::Replace(twice) = apply_extended_data_patch(Some(&once), &delta, AnswerSource::TriageStage)
        else {
            panic!("expected Replace");
        };

        assert_eq!(once, twice);
    }
}
