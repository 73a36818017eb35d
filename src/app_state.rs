use sqlx::PgPool;
use std::sync::Arc;

use crate::services::{
    extractor::WorkersAiClient,
    identity::AuthKeys,
    notifier::{EventHub, EventPublisher},
    prompts::PromptStore,
    queue::JobQueue,
    review::ReviewService,
    storage::StorageClient,
};

/// Shared application state passed to all route handlers and the worker.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<StorageClient>,
    pub queue: Arc<JobQueue>,
    pub review: Arc<ReviewService>,
    pub prompts: Arc<PromptStore>,
    pub extractor: Arc<WorkersAiClient>,
    pub notifier: EventPublisher,
    pub events: Arc<EventHub>,
    pub auth: Arc<AuthKeys>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: PgPool,
        storage: StorageClient,
        queue: JobQueue,
        review: ReviewService,
        prompts: PromptStore,
        extractor: WorkersAiClient,
        notifier: EventPublisher,
        events: Arc<EventHub>,
        auth: AuthKeys,
    ) -> Self {
        Self {
            db,
            storage: Arc::new(storage),
            queue: Arc::new(queue),
            review: Arc::new(review),
            prompts: Arc::new(prompts),
            extractor: Arc::new(extractor),
            notifier,
            events,
            auth: Arc::new(auth),
        }
    }
}
