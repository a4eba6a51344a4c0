//! Question answer store queries

use crate::error::Result;
use formbind_common::db::AnswerRecord;
use sqlx::SqliteConnection;

/// Insert or overwrite the answer for (technology, question key)
pub async fn upsert_answer(conn: &mut SqliteConnection, record: &AnswerRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO question_answers (
            technology_guid, question_key, value, question_revision_id, answered_by, answered_at
        )
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(technology_guid, question_key) DO UPDATE SET
            value = excluded.value,
            question_revision_id = excluded.question_revision_id,
            answered_by = excluded.answered_by,
            answered_at = excluded.answered_at
        "#,
    )
    .bind(&record.technology_guid)
    .bind(&record.question_key)
    .bind(&record.value)
    .bind(&record.question_revision_id)
    .bind(&record.answered_by)
    .bind(&record.answered_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// All stored answers of a technology, ordered by question key
pub async fn list_answers(conn: &mut SqliteConnection, technology_guid: &str) -> Result<Vec<AnswerRecord>> {
    let records = sqlx::query_as::<_, AnswerRecord>(
        r#"
        SELECT technology_guid, question_key, value, question_revision_id, answered_by, answered_at
        FROM question_answers
        WHERE technology_guid = ?
        ORDER BY question_key ASC
        "#,
    )
    .bind(technology_guid)
    .fetch_all(&mut *conn)
    .await?;

    Ok(records)
}
