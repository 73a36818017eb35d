use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use crate::db::parse_column;
use crate::models::prompt::PromptVersion;

const PROMPT_COLUMNS: &str =
    "id, name, version, prompt_text, parameters, status, created_at, updated_at";

fn map_version(row: &PgRow) -> Result<PromptVersion, sqlx::Error> {
    Ok(PromptVersion {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        version: row.try_get("version")?,
        prompt_text: row.try_get("prompt_text")?,
        parameters: row.try_get("parameters")?,
        status: parse_column(row.try_get("status")?, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert the next draft version for a name. The version number is
/// computed inside the statement; UNIQUE (name, version) backstops races.
pub async fn insert_version(
    executor: impl PgExecutor<'_>,
    name: &str,
    prompt_text: &str,
    parameters: &serde_json::Value,
) -> Result<PromptVersion, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO prompt_versions (name, version, prompt_text, parameters)
        VALUES (
            $1,
            1 + COALESCE((SELECT MAX(version) FROM prompt_versions WHERE name = $1), 0),
            $2,
            $3
        )
        RETURNING {PROMPT_COLUMNS}
        "#,
    ))
    .bind(name)
    .bind(prompt_text)
    .bind(parameters)
    .fetch_one(executor)
    .await?;

    map_version(&row)
}

/// The single active version for a name, if any.
pub async fn find_active(
    executor: impl PgExecutor<'_>,
    name: &str,
) -> Result<Option<PromptVersion>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {PROMPT_COLUMNS} FROM prompt_versions WHERE name = $1 AND status = 'active'"
    ))
    .bind(name)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_version).transpose()
}

/// Archive the active version for a name, if one exists.
pub async fn archive_active(
    executor: impl PgExecutor<'_>,
    name: &str,
) -> Result<Option<PromptVersion>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE prompt_versions
        SET status = 'archived', updated_at = NOW()
        WHERE name = $1 AND status = 'active'
        RETURNING {PROMPT_COLUMNS}
        "#,
    ))
    .bind(name)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_version).transpose()
}

/// Mark a version active. Caller archives the previous active version in
/// the same transaction.
pub async fn activate_version(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    name: &str,
) -> Result<Option<PromptVersion>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE prompt_versions
        SET status = 'active', updated_at = NOW()
        WHERE id = $1 AND name = $2
        RETURNING {PROMPT_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(name)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_version).transpose()
}

/// All versions for a name, newest first.
pub async fn list_versions(
    executor: impl PgExecutor<'_>,
    name: &str,
) -> Result<Vec<PromptVersion>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {PROMPT_COLUMNS} FROM prompt_versions WHERE name = $1 ORDER BY version DESC"
    ))
    .bind(name)
    .fetch_all(executor)
    .await?;

    rows.iter().map(map_version).collect()
}
