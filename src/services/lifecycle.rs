use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::document_queries;
use crate::models::document::{Document, DocumentStatus, LifecycleEvent};
use crate::services::notifier::{DocumentEvent, EventPublisher};

/// Outcome of applying a lifecycle event.
#[derive(Debug)]
pub enum Transition {
    Applied(Document),
    /// The document was already in the event's target status. Claim
    /// retries land here: a job re-claimed after a failure finds its
    /// document still `processing`.
    AlreadyApplied(Document),
}

/// Owns every document status mutation. All transitions are
/// compare-and-swap updates against the expected source status; an edge
/// outside the state machine's table is an invariant violation, reported
/// to the caller rather than silently ignored.
#[derive(Clone)]
pub struct DocumentLifecycle {
    events: EventPublisher,
}

impl DocumentLifecycle {
    pub fn new(events: EventPublisher) -> Self {
        Self { events }
    }

    /// Apply an event inside the caller's transaction. Publication is the
    /// caller's responsibility after commit (via [`Self::finish`]).
    pub async fn apply_in_tx(
        &self,
        conn: &mut PgConnection,
        document_id: Uuid,
        event: LifecycleEvent,
        confidence_score: Option<f64>,
    ) -> Result<Transition, LifecycleError> {
        let (from, to) = event.edge();

        if let Some(document) =
            document_queries::transition_status(&mut *conn, document_id, from, to, confidence_score)
                .await?
        {
            return Ok(Transition::Applied(document));
        }

        let current = document_queries::get_document(&mut *conn, document_id)
            .await?
            .ok_or(LifecycleError::NotFound(document_id))?;

        if current.status == to {
            Ok(Transition::AlreadyApplied(current))
        } else {
            Err(LifecycleError::InvalidTransition {
                from: current.status,
                to,
            })
        }
    }

    /// Publish a committed transition. Replays that changed nothing stay
    /// silent so subscribers never see duplicate status events.
    pub fn finish(&self, transition: Transition) -> Document {
        match transition {
            Transition::Applied(document) => {
                self.events.publish(DocumentEvent::from(&document));
                document
            }
            Transition::AlreadyApplied(document) => document,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("document {0} not found")]
    NotFound(Uuid),

    #[error("illegal document transition {from} -> {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
