use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::models::document::{Document, DocumentStatus};

/// Redis channel carrying document events from workers to the API server.
const EVENT_CHANNEL: &str = "docpipe:document_events";

/// Per-subscriber buffer. A subscriber that lags past this loses the
/// overflow; delivery is at-most-once with no replay.
const SUBSCRIBER_BUFFER: usize = 256;

const RECONNECT_DELAY_MS: u64 = 2000;

/// A document status change, routed to the owning user's subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEvent {
    pub document_id: Uuid,
    pub status: DocumentStatus,
    pub filename: String,
    /// Routing metadata; not part of the client-facing payload.
    pub owner_id: Uuid,
}

impl From<&Document> for DocumentEvent {
    fn from(document: &Document) -> Self {
        Self {
            document_id: document.id,
            status: document.status,
            filename: document.filename.clone(),
            owner_id: document.owner_id,
        }
    }
}

/// Fire-and-forget event publisher. Transitions must never block on (or
/// fail because of) delivery, so publishing happens on a detached task
/// and errors are logged and swallowed.
#[derive(Clone)]
pub struct EventPublisher {
    client: redis::Client,
}

impl EventPublisher {
    pub fn new(redis_url: &str) -> Result<Self, NotifyError> {
        let client = redis::Client::open(redis_url).map_err(NotifyError::Redis)?;
        Ok(Self { client })
    }

    /// Publish a document event without blocking the caller.
    pub fn publish(&self, event: DocumentEvent) {
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = publish_event(&client, &event).await {
                tracing::warn!(
                    document_id = %event.document_id,
                    error = %e,
                    "Failed to publish document event"
                );
            }
        });
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), NotifyError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(NotifyError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(NotifyError::Redis)?;
        Ok(())
    }
}

async fn publish_event(client: &redis::Client, event: &DocumentEvent) -> Result<(), NotifyError> {
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(NotifyError::Redis)?;
    let payload = serde_json::to_string(event).map_err(NotifyError::Serialize)?;
    conn.publish::<_, _, ()>(EVENT_CHANNEL, payload)
        .await
        .map_err(NotifyError::Redis)?;
    Ok(())
}

/// Server-side fan-out: one broadcast channel per document owner, fed by
/// the Redis subscription. Subscribers only ever see their own documents.
pub struct EventHub {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<DocumentEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to status changes for one owner's documents. Dropping
    /// the receiver releases the subscription.
    pub async fn subscribe(&self, owner_id: Uuid) -> broadcast::Receiver<DocumentEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(owner_id)
            .or_insert_with(|| broadcast::channel(SUBSCRIBER_BUFFER).0)
            .subscribe()
    }

    /// Route an event to the owning user's subscribers. Channels whose
    /// receivers have all gone away are pruned here.
    pub async fn dispatch(&self, event: DocumentEvent) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, sender| sender.receiver_count() > 0);
        if let Some(sender) = channels.get(&event.owner_id) {
            // No active receivers is fine
            let _ = sender.send(event);
        }
    }

    /// Run the Redis listener, dispatching incoming events until the
    /// server shuts down. Reconnects on connection loss; events published
    /// during the gap are lost (subscribers reconcile by re-fetching).
    pub fn run(self: Arc<Self>, client: redis::Client) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match client.get_async_pubsub().await {
                    Ok(mut pubsub) => {
                        if let Err(e) = pubsub.subscribe(EVENT_CHANNEL).await {
                            tracing::warn!(error = %e, "Failed to subscribe to event channel");
                        } else {
                            tracing::info!(channel = EVENT_CHANNEL, "Listening for document events");
                            let mut messages = pubsub.on_message();
                            while let Some(message) = messages.next().await {
                                match message.get_payload::<String>() {
                                    Ok(payload) => match serde_json::from_str::<DocumentEvent>(&payload) {
                                        Ok(event) => self.dispatch(event).await,
                                        Err(e) => {
                                            tracing::warn!(error = %e, "Malformed document event")
                                        }
                                    },
                                    Err(e) => {
                                        tracing::warn!(error = %e, "Unreadable document event")
                                    }
                                }
                            }
                            tracing::warn!("Document event stream closed");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Redis pub/sub connection failed");
                    }
                }
                tokio::time::sleep(Duration::from_millis(RECONNECT_DELAY_MS)).await;
            }
        })
    }

    #[cfg(test)]
    pub(crate) async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
