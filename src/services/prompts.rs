use sqlx::PgPool;
use uuid::Uuid;

use crate::db::prompt_queries;
use crate::models::prompt::PromptVersion;

/// Prompt name consumed by the document-processing handler.
pub const EXTRACTION_PROMPT: &str = "extract_review_report_data";

/// Versioned prompt configuration with at most one active version per
/// name.
pub struct PromptStore {
    pool: PgPool,
}

impl PromptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the next draft version for a name.
    pub async fn create_version(
        &self,
        name: &str,
        prompt_text: &str,
        parameters: serde_json::Value,
    ) -> Result<PromptVersion, PromptError> {
        let version =
            prompt_queries::insert_version(&self.pool, name, prompt_text, &parameters).await?;
        tracing::info!(name = %name, version = version.version, "Prompt version created");
        Ok(version)
    }

    /// Activate a version: the current active version for the name is
    /// archived and the target activated in a single transaction, so no
    /// concurrent caller can observe zero or two active versions.
    pub async fn activate(&self, id: Uuid, name: &str) -> Result<PromptVersion, PromptError> {
        let mut tx = self.pool.begin().await?;

        let archived = prompt_queries::archive_active(&mut *tx, name).await?;
        let version = prompt_queries::activate_version(&mut *tx, id, name)
            .await?
            .ok_or(PromptError::NotFound(id))?;

        tx.commit().await?;

        tracing::info!(
            name = %name,
            version = version.version,
            archived = archived.map(|v| v.version),
            "Prompt version activated"
        );
        Ok(version)
    }

    /// The single active version for a name, if any.
    pub async fn active(&self, name: &str) -> Result<Option<PromptVersion>, PromptError> {
        Ok(prompt_queries::find_active(&self.pool, name).await?)
    }

    /// All versions for a name, newest first.
    pub async fn list(&self, name: &str) -> Result<Vec<PromptVersion>, PromptError> {
        Ok(prompt_queries::list_versions(&self.pool, name).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("prompt version {0} not found")]
    NotFound(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
