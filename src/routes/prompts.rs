use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::api::{PromptActivateRequest, PromptCreateRequest};
use crate::models::prompt::PromptVersion;
use crate::services::identity::CurrentUser;
use crate::services::prompts::PromptError;

/// POST /api/v1/prompts — create the next draft version for a name.
pub async fn create_prompt(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<PromptCreateRequest>,
) -> Result<Json<PromptVersion>, StatusCode> {
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    request
        .validate()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;

    let parameters = request.parameters.unwrap_or_else(|| serde_json::json!({}));
    let version = state
        .prompts
        .create_version(&request.name, &request.prompt_text, parameters)
        .await
        .map_err(|e| {
            tracing::error!(name = %request.name, error = %e, "Failed to create prompt version");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(version))
}

/// POST /api/v1/prompts/{name}/activate — make a version the single
/// active one for its name.
pub async fn activate_prompt(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(name): Path<String>,
    Json(request): Json<PromptActivateRequest>,
) -> Result<Json<PromptVersion>, StatusCode> {
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }

    match state.prompts.activate(request.id, &name).await {
        Ok(version) => Ok(Json(version)),
        Err(PromptError::NotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(prompt_id = %request.id, error = %e, "Failed to activate prompt version");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/v1/prompts/{name} — all versions for a name, newest first.
pub async fn list_prompt_versions(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(name): Path<String>,
) -> Result<Json<Vec<PromptVersion>>, StatusCode> {
    let versions = state.prompts.list(&name).await.map_err(|e| {
        tracing::error!(name = %name, error = %e, "Failed to list prompt versions");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(versions))
}
