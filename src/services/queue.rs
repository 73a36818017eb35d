use std::time::Duration;

use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::db::{extraction_queries, job_queries};
use crate::models::document::{Document, LifecycleEvent};
use crate::models::extraction::NewExtractedField;
use crate::models::job::{Job, JobKind, JobStatus};
use crate::services::lifecycle::{DocumentLifecycle, LifecycleError, Transition};

/// Upper bound on leases reclaimed per sweep.
const RECLAIM_BATCH: i64 = 100;

/// Retry and lease tuning for the durable queue.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub default_max_attempts: i32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub lease: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(300),
            lease: Duration::from_secs(600),
        }
    }
}

/// Exponential retry delay: base doubled per recorded attempt, clamped
/// to the cap. Saturates instead of overflowing for absurd inputs.
pub fn backoff_delay(base: Duration, cap: Duration, attempts: i32) -> Duration {
    let shift = attempts.clamp(0, 62) as u32;
    let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    let secs = base.as_secs().saturating_mul(factor).min(cap.as_secs());
    Duration::from_secs(secs)
}

/// What the processor produced for a completed job.
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub fields: Vec<NewExtractedField>,
}

impl ExtractionOutcome {
    /// Document-level confidence: mean of the field confidences.
    pub fn confidence(&self) -> Option<f64> {
        if self.fields.is_empty() {
            return None;
        }
        let sum: f64 = self.fields.iter().map(|f| f.confidence_score).sum();
        Some(sum / self.fields.len() as f64)
    }
}

/// How a reported failure was resolved.
#[derive(Debug)]
pub enum FailOutcome {
    /// Below the attempt budget: back in the queue with a retry delay.
    Requeued(Job),
    /// Budget spent: the job is dead-lettered and its document failed.
    DeadLettered { job: Job, document: Document },
}

enum ResolvedFailure {
    Requeued(Job),
    DeadLettered { job: Job, transition: Transition },
}

/// The durable work queue. The jobs table is the single source of truth
/// for queue state; every mutation goes through these operations, never
/// through direct field writes.
pub struct JobQueue {
    pool: PgPool,
    lifecycle: DocumentLifecycle,
    settings: QueueSettings,
}

impl JobQueue {
    pub fn new(pool: PgPool, lifecycle: DocumentLifecycle, settings: QueueSettings) -> Self {
        Self {
            pool,
            lifecycle,
            settings,
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Create a pending job inside the caller's transaction, so document
    /// and job appear together or not at all.
    pub async fn enqueue(
        &self,
        conn: &mut PgConnection,
        document_id: Uuid,
        kind: JobKind,
        payload: serde_json::Value,
        max_attempts: i32,
    ) -> Result<Job, QueueError> {
        let job =
            job_queries::insert_job(&mut *conn, document_id, kind, &payload, max_attempts).await?;
        metrics::counter!("extraction_jobs_total").increment(1);
        tracing::debug!(job_id = %job.id, document_id = %document_id, "Job enqueued");
        Ok(job)
    }

    /// Atomically claim the oldest eligible pending job and drive its
    /// document to `processing`. Concurrent claimants never receive the
    /// same job. Returns None when nothing is eligible.
    pub async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let mut tx = self.pool.begin().await?;

        let Some(job) = job_queries::claim_next(&mut *tx, self.settings.lease.as_secs_f64()).await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        let transition = self
            .lifecycle
            .apply_in_tx(&mut tx, job.document_id, LifecycleEvent::JobClaimed, None)
            .await?;
        tx.commit().await?;

        self.lifecycle.finish(transition);
        Ok(Some(job))
    }

    /// Resolve a claimed job as completed. Job status, extracted fields,
    /// document confidence and the document transition commit as one
    /// unit: a crash can never leave a document awaiting review with no
    /// fields behind it.
    pub async fn complete(
        &self,
        job_id: Uuid,
        outcome: ExtractionOutcome,
    ) -> Result<Job, QueueError> {
        let mut tx = self.pool.begin().await?;

        let job = job_queries::complete_job(&mut *tx, job_id)
            .await?
            .ok_or(QueueError::Conflict {
                job_id,
                expected: "processing",
            })?;

        for field in &outcome.fields {
            extraction_queries::insert_field(&mut *tx, job.document_id, field).await?;
        }

        let transition = self
            .lifecycle
            .apply_in_tx(
                &mut tx,
                job.document_id,
                LifecycleEvent::JobCompleted,
                outcome.confidence(),
            )
            .await?;
        tx.commit().await?;

        self.lifecycle.finish(transition);
        metrics::counter!("extraction_jobs_completed").increment(1);
        Ok(job)
    }

    /// Record a worker-reported failure. Below the attempt budget the job
    /// returns to `pending` with an exponential backoff schedule; at the
    /// budget it is dead-lettered and the owning document fails.
    pub async fn fail(&self, job_id: Uuid, error_message: &str) -> Result<FailOutcome, QueueError> {
        let mut tx = self.pool.begin().await?;

        let job = job_queries::lock_job(&mut *tx, job_id)
            .await?
            .ok_or(QueueError::NotFound(job_id))?;
        if job.status != JobStatus::Processing {
            return Err(QueueError::Conflict {
                job_id,
                expected: "processing",
            });
        }

        let resolved = self.resolve_failure(&mut tx, &job, error_message).await?;
        tx.commit().await?;

        Ok(match resolved {
            ResolvedFailure::Requeued(job) => {
                tracing::info!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    scheduled_for = %job.scheduled_for,
                    "Job requeued for retry"
                );
                FailOutcome::Requeued(job)
            }
            ResolvedFailure::DeadLettered { job, transition } => {
                let document = self.lifecycle.finish(transition);
                metrics::counter!("extraction_jobs_failed").increment(1);
                tracing::warn!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    "Job dead-lettered after exhausting attempts"
                );
                FailOutcome::DeadLettered { job, document }
            }
        })
    }

    /// Return expired leases to the queue, spending one attempt each.
    /// This is the recovery path for jobs stranded by a crashed worker.
    /// Returns the number of jobs reclaimed.
    pub async fn reclaim_expired(&self) -> Result<usize, QueueError> {
        let mut tx = self.pool.begin().await?;

        let expired = job_queries::lock_expired_leases(&mut *tx, RECLAIM_BATCH).await?;
        if expired.is_empty() {
            tx.rollback().await?;
            return Ok(0);
        }

        let mut resolved = Vec::with_capacity(expired.len());
        for job in &expired {
            resolved.push(
                self.resolve_failure(&mut tx, job, "lease expired before the job was resolved")
                    .await?,
            );
        }
        tx.commit().await?;

        let count = resolved.len();
        for item in resolved {
            match item {
                ResolvedFailure::Requeued(job) => {
                    tracing::info!(job_id = %job.id, attempts = job.attempts, "Expired lease reclaimed");
                }
                ResolvedFailure::DeadLettered { job, transition } => {
                    self.lifecycle.finish(transition);
                    metrics::counter!("extraction_jobs_failed").increment(1);
                    tracing::warn!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        "Expired lease dead-lettered after exhausting attempts"
                    );
                }
            }
        }
        Ok(count)
    }

    /// Current number of pending jobs.
    pub async fn depth(&self) -> Result<i64, QueueError> {
        Ok(job_queries::pending_count(&self.pool).await?)
    }

    async fn resolve_failure(
        &self,
        conn: &mut PgConnection,
        job: &Job,
        error_message: &str,
    ) -> Result<ResolvedFailure, QueueError> {
        let conflict = QueueError::Conflict {
            job_id: job.id,
            expected: "processing",
        };

        if job.attempts + 1 >= job.max_attempts {
            let job = job_queries::dead_letter_job(&mut *conn, job.id, error_message)
                .await?
                .ok_or(conflict)?;
            let transition = self
                .lifecycle
                .apply_in_tx(&mut *conn, job.document_id, LifecycleEvent::JobFailed, None)
                .await?;
            Ok(ResolvedFailure::DeadLettered { job, transition })
        } else {
            let delay = backoff_delay(
                self.settings.backoff_base,
                self.settings.backoff_cap,
                job.attempts + 1,
            );
            let scheduled_for = Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64);
            let job = job_queries::requeue_job(&mut *conn, job.id, scheduled_for, error_message)
                .await?
                .ok_or(conflict)?;
            Ok(ResolvedFailure::Requeued(job))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {job_id} is not in the {expected} state")]
    Conflict { job_id: Uuid, expected: &'static str },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::extraction::BoundingBox;

    const BASE: Duration = Duration::from_secs(5);
    const CAP: Duration = Duration::from_secs(300);

    #[test]
    fn backoff_is_non_decreasing_in_attempts() {
        let mut last = Duration::ZERO;
        for attempts in 0..16 {
            let delay = backoff_delay(BASE, CAP, attempts);
            assert!(delay >= last, "delay shrank at attempt {attempts}");
            last = delay;
        }
    }

    #[test]
    fn backoff_doubles_below_the_cap() {
        assert_eq!(backoff_delay(BASE, CAP, 1), Duration::from_secs(10));
        assert_eq!(backoff_delay(BASE, CAP, 2), Duration::from_secs(20));
        assert_eq!(backoff_delay(BASE, CAP, 3), Duration::from_secs(40));
    }

    #[test]
    fn backoff_is_bounded_by_the_cap() {
        for attempts in [6, 7, 30, 62, i32::MAX] {
            assert_eq!(backoff_delay(BASE, CAP, attempts), CAP);
        }
    }

    fn field(name: &str, confidence: f64) -> NewExtractedField {
        NewExtractedField {
            field_name: name.to_string(),
            field_value: "value".to_string(),
            confidence_score: confidence,
            bounding_box: BoundingBox {
                page: 1,
                left: 0.0,
                top: 0.0,
                width: 1.0,
                height: 1.0,
            },
        }
    }

    #[test]
    fn outcome_confidence_is_the_field_mean() {
        let outcome = ExtractionOutcome {
            fields: vec![field("a", 0.9), field("b", 0.7)],
        };
        let confidence = outcome.confidence().unwrap();
        assert!((confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn outcome_without_fields_has_no_confidence() {
        let outcome = ExtractionOutcome { fields: vec![] };
        assert!(outcome.confidence().is_none());
    }
}
