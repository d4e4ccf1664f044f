//! Server-Sent Events support

use super::types::SessionSnapshot;
use crate::runtime::SessionEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert broadcast stream to SSE stream, starting with a snapshot
pub fn sse_stream(
    init: SessionSnapshot,
    broadcast_rx: tokio::sync::broadcast::Receiver<SessionEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move {
        let data = json!({ "type": "init", "session": init });
        Ok(Event::default().event("init").data(data.to_string()))
    });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(session_event_to_axum(&event))),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(init.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn session_event_to_axum(event: &SessionEvent) -> Event {
    let event_type = match event {
        SessionEvent::TurnAppended { .. } => "turn_appended",
        SessionEvent::StateChanged { .. } => "state_changed",
        SessionEvent::VoiceDraft { .. } => "voice_draft",
        SessionEvent::Speak { .. } => "speak",
        SessionEvent::Notice { .. } => "notice",
    };

    // SessionEvent serializes with its own "type" tag
    let data = serde_json::to_string(event)
        .unwrap_or_else(|e| json!({ "type": "error", "message": e.to_string() }).to_string());

    Event::default().event(event_type).data(data)
}
