//! Server-Sent Events stream
//!
//! Streams every published event to connected clients. The SSE event name is
//! the event's topic, the data is the event serialized as JSON.

use crate::api::server::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use beatsync_common::events::SyncEvent;
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// GET /events - SSE event stream
pub async fn event_stream(State(ctx): State<AppContext>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    let stream = BroadcastStream::new(ctx.state.subscribe_events()).filter_map(|result| async move {
        match result {
            Ok(event) => to_sse_event(&event).map(Ok),
            Err(e) => {
                // Lagged: the client missed events, keep streaming
                warn!("SSE stream error: {:?}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Convert a published event to an SSE frame
pub fn to_sse_event(event: &SyncEvent) -> Option<Event> {
    let payload = match event.payload() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(topic = event.topic(), "Failed to serialize event: {}", e);
            return None;
        }
    };
    // serde_json only ever writes UTF-8
    let data = String::from_utf8_lossy(&payload);
    Some(Event::default().event(event.topic()).data(data))
}
