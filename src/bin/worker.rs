use docpipe::{
    app_state::AppState,
    config::AppConfig,
    db,
    models::job::{Job, JobKind, ProcessingPayload},
    services::{
        extractor::{WorkersAiClient, DEFAULT_PROMPT},
        identity::AuthKeys,
        lifecycle::DocumentLifecycle,
        notifier::{EventHub, EventPublisher},
        prompts::{PromptStore, EXTRACTION_PROMPT},
        queue::{ExtractionOutcome, FailOutcome, JobQueue, QueueSettings},
        review::ReviewService,
        storage::StorageClient,
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting document extraction worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let storage = StorageClient::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )
    .expect("Failed to initialize R2 client");

    let notifier =
        EventPublisher::new(&config.redis_url).expect("Failed to initialize event publisher");

    let lifecycle = DocumentLifecycle::new(notifier.clone());
    let queue = JobQueue::new(
        db_pool.clone(),
        lifecycle.clone(),
        QueueSettings {
            default_max_attempts: config.job_max_attempts,
            backoff_base: Duration::from_secs(config.backoff_base_secs),
            backoff_cap: Duration::from_secs(config.backoff_cap_secs),
            lease: Duration::from_secs(config.job_lease_secs),
        },
    );
    let review = ReviewService::new(db_pool.clone(), lifecycle.clone());
    let prompts = PromptStore::new(db_pool.clone());

    let extractor = WorkersAiClient::new(&config.cf_account_id, &config.cf_api_token);
    let auth = AuthKeys::new(&config.jwt_secret);

    let state = AppState::new(
        db_pool,
        storage,
        queue,
        review,
        prompts,
        extractor,
        notifier,
        Arc::new(EventHub::new()),
        auth,
    );

    // Reclaim sweep: return expired leases to the queue so jobs stranded
    // by a crashed worker are retried.
    let reclaim_queue = state.queue.clone();
    let reclaim_interval = Duration::from_secs(config.reclaim_interval_secs);
    tokio::spawn(async move {
        loop {
            sleep(reclaim_interval).await;
            match reclaim_queue.reclaim_expired().await {
                Ok(0) => {}
                Ok(reclaimed) => tracing::info!(reclaimed, "Reclaimed expired job leases"),
                Err(e) => tracing::error!(error = %e, "Lease reclaim sweep failed"),
            }
        }
    });

    let poll_interval = config.worker_poll_interval_ms;

    tracing::info!("Worker ready, starting job processing loop");

    // Main processing loop
    loop {
        match process_next_job(&state).await {
            Ok(true) => {
                // Job processed, check for the next one immediately
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                // No job available, sleep before next poll
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(poll_interval)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing job, will retry");
                sleep(Duration::from_millis(poll_interval)).await;
            }
        }
    }
}

/// Process the next job from the queue.
/// Returns Ok(true) if a job was processed, Ok(false) if no job available.
async fn process_next_job(state: &AppState) -> Result<bool, Box<dyn std::error::Error>> {
    // Claim the oldest eligible job
    let job = match state.queue.claim_next().await? {
        Some(job) => job,
        None => {
            if let Ok(depth) = state.queue.depth().await {
                metrics::gauge!("extraction_queue_depth").set(depth as f64);
            }
            return Ok(false);
        }
    };

    tracing::info!(
        job_id = %job.id,
        document_id = %job.document_id,
        attempts = job.attempts,
        "Processing extraction job"
    );

    let start = std::time::Instant::now();

    match run_job(state, &job).await {
        Ok(outcome) => {
            let field_count = outcome.fields.len();
            state.queue.complete(job.id, outcome).await?;

            metrics::histogram!("extraction_processing_seconds")
                .record(start.elapsed().as_secs_f64());
            tracing::info!(
                job_id = %job.id,
                fields = field_count,
                duration_ms = start.elapsed().as_millis() as u64,
                "Job completed successfully"
            );

            Ok(true)
        }
        Err(e) => {
            tracing::error!(job_id = %job.id, error = %e, "Job processing failed");

            match state.queue.fail(job.id, &e.to_string()).await? {
                FailOutcome::Requeued(job) => {
                    tracing::info!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        scheduled_for = %job.scheduled_for,
                        "Job re-queued for retry"
                    );
                }
                FailOutcome::DeadLettered { job, document } => {
                    tracing::warn!(
                        job_id = %job.id,
                        document_id = %document.id,
                        attempts = job.attempts,
                        "Job failed after max retries"
                    );
                }
            }

            Ok(true)
        }
    }
}

/// Dispatch on the closed set of job kinds.
async fn run_job(state: &AppState, job: &Job) -> Result<ExtractionOutcome, Box<dyn std::error::Error>> {
    match job.kind {
        JobKind::DocumentProcessing => process_document(state, job).await,
    }
}

/// Inner handler for `document_processing` jobs.
async fn process_document(
    state: &AppState,
    job: &Job,
) -> Result<ExtractionOutcome, Box<dyn std::error::Error>> {
    let payload: ProcessingPayload = serde_json::from_value(job.payload.clone())?;

    tracing::debug!(job_id = %job.id, file_path = %payload.file_path, "Downloading document");
    let document_bytes = state.storage.download(&payload.file_path).await?;

    let prompt = state.prompts.active(EXTRACTION_PROMPT).await?;
    let (prompt_text, parameters) = match &prompt {
        Some(version) => (version.prompt_text.as_str(), version.parameters.clone()),
        None => {
            tracing::debug!(job_id = %job.id, "No active prompt version, using built-in default");
            (DEFAULT_PROMPT, serde_json::Value::Null)
        }
    };

    tracing::debug!(job_id = %job.id, "Calling Workers AI extraction model");
    let extract_start = std::time::Instant::now();
    let fields = state
        .extractor
        .extract_fields(&document_bytes, prompt_text, &parameters)
        .await?;

    tracing::info!(
        job_id = %job.id,
        extract_duration_ms = extract_start.elapsed().as_millis() as u64,
        fields = fields.len(),
        filename = %payload.filename,
        "Extraction complete"
    );

    Ok(ExtractionOutcome { fields })
}
