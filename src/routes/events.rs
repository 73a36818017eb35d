use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::app_state::AppState;
use crate::services::identity::CurrentUser;

/// GET /api/v1/events — live status stream for the caller's documents.
///
/// The stream is infinite and not restartable: events published while a
/// client is disconnected are gone, and reconnecting clients should
/// re-fetch current document state instead of expecting replay.
pub async fn document_events(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.events.subscribe(user.id).await;

    let stream = BroadcastStream::new(receiver).filter_map(|message| async move {
        // A lagged subscriber just loses the overflow.
        let event = message.ok()?;
        let payload = serde_json::json!({
            "document_id": event.document_id,
            "status": event.status,
            "filename": event.filename,
        });
        let sse = Event::default()
            .event("document_status")
            .json_data(&payload)
            .ok()?;
        Some(Ok(sse))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
