//! SSE delivery of persona responses followed by streamed coaching
//! feedback.
//!
//! The stream carries two sequential phases over one response channel: a
//! single complete `responses` event, then the lazy coaching sequence
//! (`insight`* then `summary` or `error`), closed by a `done` marker. If
//! the client disconnects mid-stream, dropping the stream aborts the
//! coaching producer task.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt, stream};
use rehearse_core::coaching::FeedbackEvent;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info};

use crate::{models::AskRequest, models::AskResponse, state::AppState};

fn json_event(name: &'static str, data: &impl serde::Serialize) -> Option<Event> {
    match serde_json::to_string(data) {
        Ok(data) => Some(Event::default().event(name).data(data)),
        Err(e) => {
            error!(event = name, error = %e, "Failed to serialize SSE event");
            None
        }
    }
}

/// Builds the SSE response for an ask request with `stream_feedback=true`.
///
/// The persona responses are already computed; the coaching producer is
/// started here and consumed lazily by the connection.
pub fn feedback_sse(
    state: Arc<AppState>,
    request: AskRequest,
    payload: AskResponse,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream_id: u32 = rand::random();
    info!(stream_id, "Starting coaching feedback stream");

    let feedback = state.coach.stream(
        &request.prompt,
        &payload.responses,
        request.lesson_context.as_ref(),
        &request.conversation_history,
    );

    let first = stream::iter(json_event("responses", &payload));

    let coaching = feedback.filter_map(move |event| async move {
        match event {
            FeedbackEvent::Insight(insight) => json_event("insight", &insight),
            FeedbackEvent::Summary { observation } => {
                json_event("summary", &json!({ "overall_observation": observation }))
            }
            FeedbackEvent::Error { message } => {
                json_event("error", &json!({ "message": message }))
            }
        }
    });

    let done = stream::once(async move {
        info!(stream_id, "Coaching feedback stream complete");
        Event::default().event("done").data("{}")
    });

    let events = first.chain(coaching).chain(done).map(Ok);
    Sse::new(events).keep_alive(KeepAlive::default())
}
