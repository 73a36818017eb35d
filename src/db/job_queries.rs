use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use crate::db::parse_column;
use crate::models::job::{Job, JobKind};

const JOB_COLUMNS: &str = "id, document_id, job_type, payload, status, attempts, max_attempts, \
     created_at, scheduled_for, started_at, completed_at, lease_expires_at, error_message";

pub(crate) fn map_job(row: &PgRow) -> Result<Job, sqlx::Error> {
    Ok(Job {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        kind: parse_column(row.try_get("job_type")?, "job_type")?,
        payload: row.try_get("payload")?,
        status: parse_column(row.try_get("status")?, "status")?,
        attempts: row.try_get("attempts")?,
        max_attempts: row.try_get("max_attempts")?,
        created_at: row.try_get("created_at")?,
        scheduled_for: row.try_get("scheduled_for")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        lease_expires_at: row.try_get("lease_expires_at")?,
        error_message: row.try_get("error_message")?,
    })
}

/// Insert a new pending job, eligible immediately.
pub async fn insert_job(
    executor: impl PgExecutor<'_>,
    document_id: Uuid,
    kind: JobKind,
    payload: &serde_json::Value,
    max_attempts: i32,
) -> Result<Job, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO jobs (document_id, job_type, payload, max_attempts)
        VALUES ($1, $2, $3, $4)
        RETURNING {JOB_COLUMNS}
        "#,
    ))
    .bind(document_id)
    .bind(kind.to_string())
    .bind(payload)
    .bind(max_attempts)
    .fetch_one(executor)
    .await?;

    map_job(&row)
}

/// Atomically claim the oldest eligible pending job. `FOR UPDATE SKIP
/// LOCKED` guarantees concurrent claimants never receive the same row.
pub async fn claim_next(
    executor: impl PgExecutor<'_>,
    lease_seconds: f64,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE jobs
        SET status = 'processing',
            started_at = NOW(),
            lease_expires_at = NOW() + make_interval(secs => $1)
        WHERE id = (
            SELECT id FROM jobs
            WHERE status = 'pending'
              AND scheduled_for <= NOW()
              AND attempts < max_attempts
            ORDER BY created_at
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {JOB_COLUMNS}
        "#,
    ))
    .bind(lease_seconds)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_job).transpose()
}

/// Get a job by ID
pub async fn get_job(
    executor: impl PgExecutor<'_>,
    job_id: Uuid,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(map_job).transpose()
}

/// Get a job by ID with a row lock held for the enclosing transaction.
pub async fn lock_job(
    executor: impl PgExecutor<'_>,
    job_id: Uuid,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE"
    ))
    .bind(job_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_job).transpose()
}

/// Resolve a claimed job as completed. Guarded on `processing` so a
/// stale caller cannot resolve a job it no longer holds.
pub async fn complete_job(
    executor: impl PgExecutor<'_>,
    job_id: Uuid,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE jobs
        SET status = 'completed',
            completed_at = NOW(),
            lease_expires_at = NULL,
            error_message = NULL
        WHERE id = $1 AND status = 'processing'
        RETURNING {JOB_COLUMNS}
        "#,
    ))
    .bind(job_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_job).transpose()
}

/// Return a claimed job to the queue with a retry schedule, spending one
/// attempt.
pub async fn requeue_job(
    executor: impl PgExecutor<'_>,
    job_id: Uuid,
    scheduled_for: DateTime<Utc>,
    error_message: &str,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE jobs
        SET status = 'pending',
            attempts = attempts + 1,
            scheduled_for = $2,
            started_at = NULL,
            lease_expires_at = NULL,
            error_message = $3
        WHERE id = $1 AND status = 'processing'
        RETURNING {JOB_COLUMNS}
        "#,
    ))
    .bind(job_id)
    .bind(scheduled_for)
    .bind(error_message)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_job).transpose()
}

/// Dead-letter a claimed job whose attempt budget is spent.
pub async fn dead_letter_job(
    executor: impl PgExecutor<'_>,
    job_id: Uuid,
    error_message: &str,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE jobs
        SET status = 'failed',
            attempts = attempts + 1,
            completed_at = NOW(),
            lease_expires_at = NULL,
            error_message = $2
        WHERE id = $1 AND status = 'processing'
        RETURNING {JOB_COLUMNS}
        "#,
    ))
    .bind(job_id)
    .bind(error_message)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_job).transpose()
}

/// Lock jobs whose lease expired, oldest expiry first, for the reclaim
/// sweep. Skips rows another sweeper already holds.
pub async fn lock_expired_leases(
    executor: impl PgExecutor<'_>,
    limit: i64,
) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS} FROM jobs
        WHERE status = 'processing' AND lease_expires_at < NOW()
        ORDER BY lease_expires_at
        LIMIT $1
        FOR UPDATE SKIP LOCKED
        "#,
    ))
    .bind(limit)
    .fetch_all(executor)
    .await?;

    rows.iter().map(map_job).collect()
}

/// Count of pending jobs (for the queue-depth gauge).
pub async fn pending_count(executor: impl PgExecutor<'_>) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS depth FROM jobs WHERE status = 'pending'")
        .fetch_one(executor)
        .await?;

    row.try_get("depth")
}
