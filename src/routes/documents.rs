use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{document_queries, extraction_queries};
use crate::models::api::{DocumentDetail, DocumentSummary, UploadFileOutcome, UploadResponse};
use crate::models::document::Document;
use crate::models::job::{JobKind, ProcessingPayload};
use crate::services::identity::CurrentUser;
use crate::services::queue::QueueError;
use crate::services::storage::StorageError;

/// Presigned URL lifetime for document viewing.
const FILE_URL_EXPIRY_SECS: u32 = 600;

/// POST /api/v1/documents — upload one or more files for extraction.
///
/// Each file is stored, recorded and enqueued independently; one file
/// failing never aborts the rest of the batch.
pub async fn upload_documents(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, StatusCode> {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    let mut building_id: Option<Uuid> = None;
    let mut revision_type_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().map(|name| name.to_string());
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                files.push((filename, data.to_vec()));
            }
            Some("building_id") => {
                let text = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                building_id = Some(text.parse().map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            Some("revision_type_id") => {
                let text = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                revision_type_id = Some(text.parse().map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mut results = Vec::with_capacity(files.len());
    for (filename, data) in files {
        match ingest_file(&state, &user, &filename, &data, building_id, revision_type_id).await {
            Ok(document) => {
                metrics::counter!("documents_uploaded_total").increment(1);
                results.push(UploadFileOutcome {
                    filename,
                    document_id: Some(document.id),
                    status: document.status.to_string(),
                    error: None,
                });
            }
            Err(e) => {
                tracing::warn!(filename = %filename, error = %e, "Upload failed");
                results.push(UploadFileOutcome {
                    filename,
                    document_id: None,
                    status: "failed".to_string(),
                    error: Some(e.to_string()),
                });
            }
        }
    }

    Ok(Json(UploadResponse { results }))
}

/// Store one file and create its document + job as a single unit, so a
/// failure at any step leaves no orphan document behind.
async fn ingest_file(
    state: &AppState,
    user: &CurrentUser,
    filename: &str,
    data: &[u8],
    building_id: Option<Uuid>,
    revision_type_id: Option<Uuid>,
) -> Result<Document, UploadError> {
    let storage_path = format!("documents/{}/{}", Uuid::new_v4(), filename);
    state
        .storage
        .put(&storage_path, data, "application/octet-stream")
        .await?;

    let payload = serde_json::to_value(ProcessingPayload {
        file_path: storage_path.clone(),
        filename: filename.to_string(),
        building_id,
        revision_type_id,
    })?;

    let mut tx = state.db.begin().await.map_err(UploadError::Database)?;
    let document = document_queries::insert_document(
        &mut *tx,
        filename,
        &storage_path,
        user.id,
        data.len() as i64,
    )
    .await
    .map_err(UploadError::Database)?;
    state
        .queue
        .enqueue(
            &mut tx,
            document.id,
            JobKind::DocumentProcessing,
            payload,
            state.queue.settings().default_max_attempts,
        )
        .await?;
    tx.commit().await.map_err(UploadError::Database)?;

    Ok(document)
}

#[derive(Debug, thiserror::Error)]
enum UploadError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
}

/// GET /api/v1/documents — the caller's documents, newest first.
pub async fn list_documents(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<DocumentSummary>>, StatusCode> {
    let documents = document_queries::list_for_owner(&state.db, user.id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list documents");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(documents.iter().map(DocumentSummary::from).collect()))
}

/// GET /api/v1/documents/{id} — document detail with extracted fields
/// and a short-lived download URL.
pub async fn get_document(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DocumentDetail>, StatusCode> {
    let document = document_queries::get_document(&state.db, document_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to load document");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    if !user.can_access(document.owner_id) {
        return Err(StatusCode::NOT_FOUND);
    }

    let extracted_fields = extraction_queries::list_for_document(&state.db, document_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to load extracted fields");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let file_url = state
        .storage
        .presigned_url(&document.storage_path, FILE_URL_EXPIRY_SECS)
        .await
        .ok();

    Ok(Json(DocumentDetail {
        document: DocumentSummary::from(&document),
        extracted_fields,
        file_url,
    }))
}
