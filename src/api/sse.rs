//! Server-Sent Events support

use crate::runtime::EngineUpdate;
use crate::state_machine::ConversationView;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Start with the current view, then forward every engine update
pub fn sse_stream(
    init_view: ConversationView,
    broadcast_rx: tokio::sync::broadcast::Receiver<EngineUpdate>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move {
        Ok(to_axum_event("init", json!({ "type": "init", "view": init_view })))
    });

    let updates = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(update) => Some(Ok(update_to_axum(update))),
        Err(_) => None, // Lagged clients catch up on the next view
    });

    Sse::new(init.chain(updates)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn update_to_axum(update: EngineUpdate) -> Event {
    match update {
        EngineUpdate::View { view } => {
            to_axum_event("view", json!({ "type": "view", "view": view }))
        }
        EngineUpdate::Reveal {
            turn_index,
            shown,
            complete,
        } => to_axum_event(
            "reveal",
            json!({
                "type": "reveal",
                "turn_index": turn_index,
                "shown": shown,
                "complete": complete
            }),
        ),
        EngineUpdate::Notice { notice } => {
            to_axum_event("notice", json!({ "type": "notice", "notice": notice }))
        }
        EngineUpdate::Error { message } => {
            to_axum_event("error", json!({ "type": "error", "message": message }))
        }
    }
}

fn to_axum_event(event_type: &str, data: serde_json::Value) -> Event {
    Event::default().event(event_type).data(data.to_string())
}
