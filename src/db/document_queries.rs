use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use crate::db::parse_column;
use crate::models::document::{Document, DocumentStatus};

const DOCUMENT_COLUMNS: &str = "id, filename, storage_path, status, owner_id, size_bytes, \
     confidence_score, created_at, updated_at, processed_at";

pub(crate) fn map_document(row: &PgRow) -> Result<Document, sqlx::Error> {
    Ok(Document {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        storage_path: row.try_get("storage_path")?,
        status: parse_column(row.try_get("status")?, "status")?,
        owner_id: row.try_get("owner_id")?,
        size_bytes: row.try_get("size_bytes")?,
        confidence_score: row.try_get("confidence_score")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

/// Insert a new document in its initial `queued` state.
pub async fn insert_document(
    executor: impl PgExecutor<'_>,
    filename: &str,
    storage_path: &str,
    owner_id: Uuid,
    size_bytes: i64,
) -> Result<Document, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO documents (filename, storage_path, owner_id, size_bytes)
        VALUES ($1, $2, $3, $4)
        RETURNING {DOCUMENT_COLUMNS}
        "#,
    ))
    .bind(filename)
    .bind(storage_path)
    .bind(owner_id)
    .bind(size_bytes)
    .fetch_one(executor)
    .await?;

    map_document(&row)
}

/// Get a document by ID
pub async fn get_document(
    executor: impl PgExecutor<'_>,
    document_id: Uuid,
) -> Result<Option<Document>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
    ))
    .bind(document_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_document).transpose()
}

/// Get a document by ID with a row lock, serializing concurrent reviewers.
pub async fn lock_document(
    executor: impl PgExecutor<'_>,
    document_id: Uuid,
) -> Result<Option<Document>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1 FOR UPDATE"
    ))
    .bind(document_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_document).transpose()
}

/// List an owner's documents, newest first.
pub async fn list_for_owner(
    executor: impl PgExecutor<'_>,
    owner_id: Uuid,
) -> Result<Vec<Document>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_id = $1 ORDER BY created_at DESC"
    ))
    .bind(owner_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(map_document).collect()
}

/// Compare-and-swap status transition. Stamps `processed_at` exactly when
/// entering a terminal status and applies the extraction confidence when
/// provided. Returns None when the document is not in `from` anymore.
pub async fn transition_status(
    executor: impl PgExecutor<'_>,
    document_id: Uuid,
    from: DocumentStatus,
    to: DocumentStatus,
    confidence_score: Option<f64>,
) -> Result<Option<Document>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE documents
        SET status = $3,
            updated_at = NOW(),
            processed_at = CASE WHEN $3 IN ('completed', 'failed') THEN NOW() ELSE processed_at END,
            confidence_score = COALESCE($4, confidence_score)
        WHERE id = $1 AND status = $2
        RETURNING {DOCUMENT_COLUMNS}
        "#,
    ))
    .bind(document_id)
    .bind(from.to_string())
    .bind(to.to_string())
    .bind(confidence_score)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_document).transpose()
}
