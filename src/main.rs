use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use docpipe::app_state::AppState;
use docpipe::config::AppConfig;
use docpipe::db;
use docpipe::routes;
use docpipe::services::{
    extractor::WorkersAiClient,
    identity::AuthKeys,
    lifecycle::DocumentLifecycle,
    notifier::{EventHub, EventPublisher},
    prompts::PromptStore,
    queue::{JobQueue, QueueSettings},
    review::ReviewService,
    storage::StorageClient,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing docpipe server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "extraction_processing_seconds",
        "Time to process a document extraction job"
    );
    metrics::describe_counter!("documents_uploaded_total", "Total documents uploaded");
    metrics::describe_counter!("extraction_jobs_total", "Total extraction jobs enqueued");
    metrics::describe_counter!(
        "extraction_jobs_completed",
        "Total extraction jobs completed"
    );
    metrics::describe_counter!(
        "extraction_jobs_failed",
        "Total extraction jobs dead-lettered"
    );
    metrics::describe_counter!(
        "feedback_records_total",
        "Total review corrections recorded"
    );
    metrics::describe_gauge!(
        "extraction_queue_depth",
        "Current number of pending jobs in the queue"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize R2 storage client
    tracing::info!("Initializing R2 storage client");
    let storage = StorageClient::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )
    .expect("Failed to initialize R2 client");

    // Initialize realtime event transport
    tracing::info!("Connecting to Redis event transport");
    let notifier =
        EventPublisher::new(&config.redis_url).expect("Failed to initialize event publisher");

    let events = Arc::new(EventHub::new());
    let redis_client =
        redis::Client::open(config.redis_url.as_str()).expect("Failed to open Redis client");
    let _event_listener = events.clone().run(redis_client);

    // Core services
    let lifecycle = DocumentLifecycle::new(notifier.clone());
    let queue = JobQueue::new(
        db_pool.clone(),
        lifecycle.clone(),
        QueueSettings {
            default_max_attempts: config.job_max_attempts,
            backoff_base: std::time::Duration::from_secs(config.backoff_base_secs),
            backoff_cap: std::time::Duration::from_secs(config.backoff_cap_secs),
            lease: std::time::Duration::from_secs(config.job_lease_secs),
        },
    );
    let review = ReviewService::new(db_pool.clone(), lifecycle.clone());
    let prompts = PromptStore::new(db_pool.clone());

    // Initialize Workers AI client
    tracing::info!("Initializing Cloudflare Workers AI client");
    let extractor = WorkersAiClient::new(&config.cf_account_id, &config.cf_api_token);

    let auth = AuthKeys::new(&config.jwt_secret);

    // Create shared application state
    let state = AppState::new(
        db_pool, storage, queue, review, prompts, extractor, notifier, events, auth,
    );

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/documents",
            post(routes::documents::upload_documents).get(routes::documents::list_documents),
        )
        .route(
            "/api/v1/documents/{document_id}",
            get(routes::documents::get_document),
        )
        .route(
            "/api/v1/documents/{document_id}/review",
            post(routes::review::submit_review),
        )
        .route("/api/v1/events", get(routes::events::document_events))
        .route("/api/v1/prompts", post(routes::prompts::create_prompt))
        .route(
            "/api/v1/prompts/{name}",
            get(routes::prompts::list_prompt_versions),
        )
        .route(
            "/api/v1/prompts/{name}/activate",
            post(routes::prompts::activate_prompt),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(50 * 1024 * 1024)); // 50 MB limit

    tracing::info!("Starting docpipe on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
