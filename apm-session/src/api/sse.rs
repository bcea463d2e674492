//! GET /events - SSE stream of session events

use crate::AppState;
use apm_common::sse::create_event_sse_stream;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

/// Streams StepChanged, PredictionReceived, SubmissionFailed, ReportReady,
/// SaveStatusChanged, NoticeRaised and SessionRestarted events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    create_event_sse_stream("apm-session", &state.event_bus)
}
