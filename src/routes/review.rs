use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{ReviewRequest, ReviewResponse};
use crate::services::identity::CurrentUser;
use crate::services::review::ReviewError;

/// POST /api/v1/documents/{id}/review — accept a review, recording
/// correction deltas and completing the document.
pub async fn submit_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(document_id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>, StatusCode> {
    if !user.can_review() {
        return Err(StatusCode::FORBIDDEN);
    }
    request
        .validate()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;

    match state
        .review
        .accept_review(document_id, &request.corrected_fields, user.id)
        .await
    {
        Ok(summary) => Ok(Json(ReviewResponse {
            document_id,
            status: summary.document.status,
            changed_fields: summary.changed_fields,
        })),
        Err(ReviewError::NotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(ReviewError::InvalidState { status, .. }) => {
            tracing::warn!(
                document_id = %document_id,
                reviewer_id = %user.id,
                role = %user.role,
                status = %status,
                "Review rejected: document is not awaiting review"
            );
            Err(StatusCode::CONFLICT)
        }
        Err(e) => {
            tracing::error!(document_id = %document_id, error = %e, "Review failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
