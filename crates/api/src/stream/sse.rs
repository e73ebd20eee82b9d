//! Server-sent events over the live publisher.
//!
//! Each stream gets its own channel and publisher task. When the client goes
//! away axum drops the receiver, the task's sink reports closed, and the
//! publisher loop exits within one poll interval. Server shutdown ends every
//! open stream through [`AppState::shutdown`].

use std::convert::Infallible;
use std::str::FromStr;

use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use futures::{Stream, StreamExt};
use snipgate_core::publisher::StreamEvent;
use snipgate_core::types::DbId;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Events buffered between a publisher loop and the HTTP body.
const CHANNEL_CAPACITY: usize = 32;

/// Parse the `Last-Event-ID` header sent by reconnecting clients.
pub fn last_event_id<T: FromStr>(headers: &HeaderMap) -> AppResult<Option<T>> {
    let Some(raw) = headers.get("last-event-id") else {
        return Ok(None);
    };
    let raw = raw
        .to_str()
        .map_err(|_| AppError::BadRequest("Last-Event-ID must be visible ASCII".into()))?
        .trim();
    raw.parse()
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("Invalid Last-Event-ID '{raw}'")))
}

/// Stream the progress log of `job_id` after `cursor`.
pub fn job_stream(
    state: &AppState,
    job_id: DbId,
    cursor: DbId,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let publisher = state.publisher.clone();
    tokio::spawn(async move {
        let end = publisher.stream_job(job_id, cursor, &tx).await;
        tracing::debug!(job_id, ?end, "Job log SSE stream ended");
    });
    into_sse(state, rx)
}

/// Stream the output of `correlation_id` from byte `offset`.
pub fn output_stream(
    state: &AppState,
    correlation_id: Uuid,
    offset: usize,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let publisher = state.publisher.clone();
    tokio::spawn(async move {
        let end = publisher.stream_output(correlation_id, offset, &tx).await;
        tracing::debug!(%correlation_id, ?end, "Output SSE stream ended");
    });
    into_sse(state, rx)
}

fn into_sse(
    state: &AppState,
    rx: mpsc::Receiver<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(to_event(&event)))
        .take_until(state.shutdown.clone().cancelled_owned());
    Sse::new(stream)
}

/// `event:` is the variant name, `id:` the resume cursor when there is one.
fn to_event(event: &StreamEvent) -> Event {
    let mut sse = Event::default().event(event.name());
    if let Some(cursor) = event.cursor() {
        sse = sse.id(cursor);
    }
    sse.json_data(event).unwrap_or_else(|e| {
        tracing::error!(error = %e, event = event.name(), "Failed to encode stream event");
        Event::default()
            .event("error")
            .data(r#"{"type":"error","message":"Failed to encode event"}"#)
    })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn last_event_id_parses_numbers() {
        let mut headers = HeaderMap::new();
        assert_eq!(last_event_id::<DbId>(&headers).unwrap(), None);

        headers.insert("last-event-id", HeaderValue::from_static(" 42 "));
        assert_eq!(last_event_id::<DbId>(&headers).unwrap(), Some(42));

        headers.insert("last-event-id", HeaderValue::from_static("abc"));
        assert!(last_event_id::<usize>(&headers).is_err());
    }
}
