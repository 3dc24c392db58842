//! Axum routes for the Messages API

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json, Router, routing};
use conduit_core::{HttpError, RequestContext};
use futures_util::StreamExt;
use serde_json::json;

use crate::error::LlmError;
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::relay::EventStream;
use crate::types::StreamEvent;

/// Build the LLM router
///
/// Expects a [`RequestContext`] extension on every request.
pub fn llm_router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/v1/messages", routing::post(messages))
        .route("/v1/messages/count_tokens", routing::post(count_tokens))
        .with_state(pipeline)
}

/// Handle `POST /v1/messages`
async fn messages(
    State(pipeline): State<Arc<Pipeline>>,
    Extension(context): Extension<RequestContext>,
    body: Bytes,
) -> Response {
    // Dropped when the client disconnects, which cancels the upstream call
    let guard = context.cancellation.clone().drop_guard();

    match pipeline.handle(&context, &body, context.client_id()).await {
        Ok(PipelineOutput::Complete(response)) => Json(response).into_response(),
        Ok(PipelineOutput::Stream(events)) => stream_response(events, guard).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `POST /v1/messages/count_tokens`
async fn count_tokens(State(pipeline): State<Arc<Pipeline>>, body: Bytes) -> Response {
    match pipeline.count_tokens(&body) {
        Ok(input_tokens) => Json(json!({ "input_tokens": input_tokens })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Build an SSE response, each event named after its type
fn stream_response(
    events: EventStream,
    guard: tokio_util::sync::DropGuard,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let events = events.map(move |event| {
        // The guard lives as long as the response body
        let _ = &guard;
        Ok(sse_event(&event))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn sse_event(event: &StreamEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize stream event");
        json!({
            "type": "error",
            "error": { "type": "api_error", "message": "failed to serialize event" }
        })
        .to_string()
    });

    Event::default().event(event.event_type()).data(data)
}

/// Render an error in the Messages API error shape
pub fn error_response(error: &LlmError) -> Response {
    let status = error.status_code();

    match error {
        LlmError::Canceled => tracing::debug!("request canceled by client"),
        _ if status.is_server_error() => tracing::warn!(error = %error, status = %status, "request failed"),
        _ => tracing::debug!(error = %error, status = %status, "request rejected"),
    }

    let body = json!({
        "type": "error",
        "error": {
            "type": error.error_type(),
            "message": error.client_message(),
        }
    });

    let mut response = (status, Json(body)).into_response();
    if let Some(secs) = error.retry_after() {
        response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}
