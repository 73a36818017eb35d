//! Integration tests for the extraction pipeline core.
//!
//! These exercise the durable queue, the document lifecycle and the
//! review loop against a real PostgreSQL instance (and a Redis URL for
//! the event publisher; events are fire-and-forget, so Redis does not
//! need to be reachable for assertions to hold).
//!
//! Requires DATABASE_URL (and optionally REDIS_URL) in the environment;
//! migrations are applied on startup. The queue test truncates the
//! documents/jobs tables, so point DATABASE_URL at a dedicated test
//! database.
//!
//! Run with: cargo test --test pipeline_integration_test -- --ignored

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use docpipe::db::{self, document_queries, extraction_queries, feedback_queries, job_queries};
use docpipe::models::document::{Document, DocumentStatus};
use docpipe::models::extraction::{BoundingBox, NewExtractedField};
use docpipe::models::job::{Job, JobKind, JobStatus, ProcessingPayload};
use docpipe::models::prompt::PromptStatus;
use docpipe::services::lifecycle::DocumentLifecycle;
use docpipe::services::notifier::EventPublisher;
use docpipe::services::prompts::PromptStore;
use docpipe::services::queue::{ExtractionOutcome, FailOutcome, JobQueue, QueueSettings};
use docpipe::services::review::{ReviewError, ReviewService};

struct TestContext {
    pool: PgPool,
    queue: Arc<JobQueue>,
    review: ReviewService,
    prompts: PromptStore,
}

async fn test_context() -> TestContext {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let pool = db::init_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let notifier = EventPublisher::new(&redis_url).expect("Failed to initialize event publisher");
    let lifecycle = DocumentLifecycle::new(notifier);

    // Zero backoff so failed jobs are immediately claimable again.
    let queue = Arc::new(JobQueue::new(
        pool.clone(),
        lifecycle.clone(),
        QueueSettings {
            default_max_attempts: 3,
            backoff_base: Duration::from_secs(0),
            backoff_cap: Duration::from_secs(0),
            lease: Duration::from_secs(600),
        },
    ));
    let review = ReviewService::new(pool.clone(), lifecycle);
    let prompts = PromptStore::new(pool.clone());

    TestContext {
        pool,
        queue,
        review,
        prompts,
    }
}

async fn enqueue_document(ctx: &TestContext, filename: &str, max_attempts: i32) -> (Document, Job) {
    let storage_path = format!("documents/{}/{filename}", Uuid::new_v4());
    let payload = serde_json::to_value(ProcessingPayload {
        file_path: storage_path.clone(),
        filename: filename.to_string(),
        building_id: None,
        revision_type_id: None,
    })
    .unwrap();

    let mut tx = ctx.pool.begin().await.unwrap();
    let document = document_queries::insert_document(
        &mut *tx,
        filename,
        &storage_path,
        Uuid::new_v4(),
        1024,
    )
    .await
    .unwrap();
    let job = ctx
        .queue
        .enqueue(
            &mut tx,
            document.id,
            JobKind::DocumentProcessing,
            payload,
            max_attempts,
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    (document, job)
}

fn sample_field(name: &str, value: &str, confidence: f64) -> NewExtractedField {
    NewExtractedField {
        field_name: name.to_string(),
        field_value: value.to_string(),
        confidence_score: confidence,
        bounding_box: BoundingBox {
            page: 1,
            left: 0.1,
            top: 0.2,
            width: 0.3,
            height: 0.05,
        },
    }
}

/// Full queue + lifecycle + review pass. Kept as one test because the
/// claim protocol operates on the shared jobs table; splitting it across
/// parallel tests would let one test claim another's jobs.
#[tokio::test]
#[ignore] // Run with: cargo test --test pipeline_integration_test -- --ignored
async fn test_queue_lifecycle_and_review() {
    let ctx = test_context().await;

    // Clean slate so older runs cannot satisfy (or steal) claims.
    sqlx::query("TRUNCATE documents CASCADE")
        .execute(&ctx.pool)
        .await
        .expect("Failed to truncate test tables");

    // 1. Enqueue one job and race 8 claimants against it: exactly one
    //    may win, the rest must see an empty queue.
    let (document, job) = enqueue_document(&ctx, "inspection_report.pdf", 3).await;
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 0);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let queue = ctx.queue.clone();
        handles.push(tokio::spawn(async move { queue.claim_next().await }));
    }
    let results = futures::future::join_all(handles).await;
    let claimed: Vec<Job> = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .flatten()
        .collect();

    assert_eq!(claimed.len(), 1, "claim must be exclusive");
    let claimed_job = &claimed[0];
    assert_eq!(claimed_job.id, job.id);
    assert_eq!(claimed_job.status, JobStatus::Processing);
    assert!(claimed_job.started_at.is_some());
    assert!(claimed_job.lease_expires_at.is_some());

    let document = document_queries::get_document(&ctx.pool, document.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Processing);
    assert!(document.processed_at.is_none());

    // 2. Complete the job: fields, confidence and the awaiting_review
    //    transition land together.
    let outcome = ExtractionOutcome {
        fields: vec![
            sample_field("total", "1250.00", 0.9),
            sample_field("inspection_date", "2026-03-01", 0.7),
        ],
    };
    let completed = ctx.queue.complete(job.id, outcome).await.unwrap();
    assert_eq!(completed.document_id, document.id);

    let stored_job = job_queries::get_job(&ctx.pool, job.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored_job.status, JobStatus::Completed);
    assert!(stored_job.completed_at.is_some());

    let document = document_queries::get_document(&ctx.pool, document.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.status, DocumentStatus::AwaitingReview);
    let confidence = document.confidence_score.expect("confidence should be set");
    assert!((confidence - 0.8).abs() < 1e-9);

    let fields = extraction_queries::list_for_document(&ctx.pool, document.id)
        .await
        .unwrap();
    assert_eq!(fields.len(), 2);

    // 3. Accept a review correcting one field and confirming the other:
    //    exactly one feedback record, document completed.
    let reviewer = Uuid::new_v4();
    let corrections = HashMap::from([
        ("total".to_string(), "1205.00".to_string()),
        ("inspection_date".to_string(), "2026-03-01".to_string()),
    ]);
    let summary = ctx
        .review
        .accept_review(document.id, &corrections, reviewer)
        .await
        .unwrap();
    assert_eq!(summary.changed_fields, 1);
    assert_eq!(summary.document.status, DocumentStatus::Completed);
    assert!(summary.document.processed_at.is_some());

    let records = feedback_queries::list_for_document(&ctx.pool, document.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].field_name, "total");
    assert_eq!(records[0].ai_value, "1250.00");
    assert_eq!(records[0].human_value, "1205.00");
    assert_eq!(records[0].reviewer_id, reviewer);

    // 4. A second submission hits the awaiting_review precondition.
    let rejected = ctx
        .review
        .accept_review(document.id, &corrections, reviewer)
        .await;
    assert!(matches!(
        rejected,
        Err(ReviewError::InvalidState {
            status: DocumentStatus::Completed,
            ..
        })
    ));

    // 5. Failure path: fail a 3-attempt job three times in a row.
    let (failing_document, failing_job) = enqueue_document(&ctx, "corrupt.pdf", 3).await;

    for attempt in 1..=3 {
        let claimed = ctx
            .queue
            .claim_next()
            .await
            .unwrap()
            .expect("job should be claimable");
        assert_eq!(claimed.id, failing_job.id);

        let outcome = ctx
            .queue
            .fail(claimed.id, "processor exploded")
            .await
            .unwrap();
        match outcome {
            FailOutcome::Requeued(job) => {
                assert!(attempt < 3, "attempt {attempt} should have dead-lettered");
                assert_eq!(job.attempts, attempt);
                assert_eq!(job.status, JobStatus::Pending);
            }
            FailOutcome::DeadLettered { job, document } => {
                assert_eq!(attempt, 3);
                assert_eq!(job.attempts, 3);
                assert_eq!(job.status, JobStatus::Failed);
                assert!(job.completed_at.is_some());
                assert_eq!(document.status, DocumentStatus::Failed);
                assert!(document.processed_at.is_some());
            }
        }
    }

    let dead = job_queries::get_job(&ctx.pool, failing_job.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dead.status, JobStatus::Failed);
    assert_eq!(dead.attempts, dead.max_attempts);
    assert!(
        ctx.queue.claim_next().await.unwrap().is_none(),
        "dead-lettered jobs must never be claimed again"
    );

    let failed_document = document_queries::get_document(&ctx.pool, failing_document.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed_document.status, DocumentStatus::Failed);

    // 6. Queue depth gauge source.
    enqueue_document(&ctx, "pending.pdf", 3).await;
    assert!(ctx.queue.depth().await.unwrap() >= 1);
}

/// Activation swap: after activating v2 over an active v1, exactly one
/// version is active for the name and it is v2.
#[tokio::test]
#[ignore] // Run with: cargo test --test pipeline_integration_test -- --ignored
async fn test_prompt_activation_swap() {
    let ctx = test_context().await;

    let name = format!("extract_review_report_data_{}", Uuid::new_v4().simple());

    let v1 = ctx
        .prompts
        .create_version(&name, "Extract the report fields.", serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(v1.version, 1);
    assert_eq!(v1.status, PromptStatus::Draft);

    ctx.prompts.activate(v1.id, &name).await.unwrap();

    let v2 = ctx
        .prompts
        .create_version(
            &name,
            "Extract the report fields, including bounding boxes.",
            serde_json::json!({"max_tokens": 2048}),
        )
        .await
        .unwrap();
    assert_eq!(v2.version, 2);

    ctx.prompts.activate(v2.id, &name).await.unwrap();

    let versions = ctx.prompts.list(&name).await.unwrap();
    let active: Vec<_> = versions
        .iter()
        .filter(|v| v.status == PromptStatus::Active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, v2.id);

    let archived = versions.iter().find(|v| v.id == v1.id).unwrap();
    assert_eq!(archived.status, PromptStatus::Archived);

    let current = ctx.prompts.active(&name).await.unwrap().unwrap();
    assert_eq!(current.id, v2.id);
}
