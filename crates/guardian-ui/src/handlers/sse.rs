use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use guardian_core::events::EventHub;
use tokio::sync::broadcast;
use tracing::warn;

/// `GET /events` — server-sent events: `request-added`, `request-removed`,
/// `domain-request-added`, `domain-request-removed`. Each message's `data:`
/// is the JSON of the affected request (or `{id}` for a removal).
pub async fn sse_handler(State(hub): State<Arc<EventHub>>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = hub.subscribe();
    let stream = async_stream::stream! {
        yield Ok(Event::default().event("handshake").data("connected"));
        loop {
            match rx.recv().await {
                Ok(event) => yield Ok(Event::default().event(event.name()).data(event.data())),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE stream lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}
