//! Server-Sent Events for session lifecycle notifications

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /events
///
/// Streams `SessionStateChanged`, `TimelineReady` and `SessionFailed`
/// events plus a periodic heartbeat. Events with `notify: false` come from
/// silent cleanup and are not meant for the therapist.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    gmp_common::sse::create_event_sse_stream("gmp-ms", &state.event_bus)
}
