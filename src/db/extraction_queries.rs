use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use crate::db::decode_json;
use crate::models::extraction::{ExtractedField, NewExtractedField};

const FIELD_COLUMNS: &str =
    "id, document_id, field_name, field_value, confidence_score, bounding_box, created_at";

fn map_field(row: &PgRow) -> Result<ExtractedField, sqlx::Error> {
    Ok(ExtractedField {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        field_name: row.try_get("field_name")?,
        field_value: row.try_get("field_value")?,
        confidence_score: row.try_get("confidence_score")?,
        bounding_box: decode_json(row.try_get("bounding_box")?, "bounding_box")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert one extracted field. Runs inside the job-completion
/// transaction; fields are never written outside it.
pub async fn insert_field(
    executor: impl PgExecutor<'_>,
    document_id: Uuid,
    field: &NewExtractedField,
) -> Result<ExtractedField, sqlx::Error> {
    let bounding_box = serde_json::to_value(&field.bounding_box)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO extracted_fields (document_id, field_name, field_value, confidence_score, bounding_box)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {FIELD_COLUMNS}
        "#,
    ))
    .bind(document_id)
    .bind(&field.field_name)
    .bind(&field.field_value)
    .bind(field.confidence_score)
    .bind(bounding_box)
    .fetch_one(executor)
    .await?;

    map_field(&row)
}

/// All extracted fields for a document, in extraction order.
pub async fn list_for_document(
    executor: impl PgExecutor<'_>,
    document_id: Uuid,
) -> Result<Vec<ExtractedField>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {FIELD_COLUMNS} FROM extracted_fields WHERE document_id = $1 ORDER BY created_at, field_name"
    ))
    .bind(document_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(map_field).collect()
}
