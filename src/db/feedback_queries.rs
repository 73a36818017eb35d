use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use crate::models::feedback::{FeedbackRecord, NewFeedbackRecord};

const FEEDBACK_COLUMNS: &str =
    "id, document_id, field_name, ai_value, human_value, reviewer_id, created_at";

fn map_record(row: &PgRow) -> Result<FeedbackRecord, sqlx::Error> {
    Ok(FeedbackRecord {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        field_name: row.try_get("field_name")?,
        ai_value: row.try_get("ai_value")?,
        human_value: row.try_get("human_value")?,
        reviewer_id: row.try_get("reviewer_id")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Record one correction delta.
pub async fn insert_record(
    executor: impl PgExecutor<'_>,
    document_id: Uuid,
    reviewer_id: Uuid,
    record: &NewFeedbackRecord,
) -> Result<FeedbackRecord, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO feedback_records (document_id, field_name, ai_value, human_value, reviewer_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {FEEDBACK_COLUMNS}
        "#,
    ))
    .bind(document_id)
    .bind(&record.field_name)
    .bind(&record.ai_value)
    .bind(&record.human_value)
    .bind(reviewer_id)
    .fetch_one(executor)
    .await?;

    map_record(&row)
}

/// Corrections recorded for a document, oldest first.
pub async fn list_for_document(
    executor: impl PgExecutor<'_>,
    document_id: Uuid,
) -> Result<Vec<FeedbackRecord>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {FEEDBACK_COLUMNS} FROM feedback_records WHERE document_id = $1 ORDER BY created_at"
    ))
    .bind(document_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(map_record).collect()
}
