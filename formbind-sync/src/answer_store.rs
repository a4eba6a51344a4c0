//! Per-question answer store writer
//!
//! Every meaningful submitted answer is upserted under (technology, question
//! key), whether or not it is also projected onto a typed column. Empty
//! values are skipped: they neither create nor clear a record.

use crate::binding::BindingMap;
use crate::db::answers::upsert_answer;
use crate::db::WriteStamp;
use crate::error::Result;
use crate::extract::Answers;
use formbind_common::db::AnswerRecord;
use formbind_common::has_meaningful_value;
use sqlx::SqliteConnection;
use tracing::debug;

/// Upsert answer records for a technology; returns how many were written
pub async fn write_answer_records(
    conn: &mut SqliteConnection,
    technology_guid: &str,
    bindings: &BindingMap,
    answers: &Answers,
    stamp: WriteStamp<'_>,
) -> Result<usize> {
    let mut written = 0;

    for (key, value) in answers {
        if !has_meaningful_value(value) {
            debug!(question_key = %key, "Skipping empty answer");
            continue;
        }

        let record = AnswerRecord {
            technology_guid: technology_guid.to_string(),
            question_key: key.clone(),
            value: serde_json::to_string(value)?,
            question_revision_id: bindings.get(key).and_then(|b| b.current_revision_id.clone()),
            answered_by: stamp.actor.to_string(),
            answered_at: stamp.at.to_string(),
        };
        upsert_answer(conn, &record).await?;
        written += 1;
    }

    Ok(written)
}
