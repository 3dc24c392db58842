//! Mock provider backend for integration tests
//!
//! Serves canned OpenAI chat completions and Messages API replies under `/v1`
//! and Gemini `generateContent` under `/v1beta`, in both buffered and
//! streaming form.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const DEFAULT_CONTENT: &str = "Hello from mock LLM";

/// Mock backend that returns predictable responses
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    request_count: AtomicU32,
    /// Number of requests to fail before succeeding (0 = never fail)
    fail_count: AtomicU32,
    failure_status: StatusCode,
    retry_after: Option<u64>,
    response_content: String,
    last_request: Mutex<Option<Value>>,
}

impl MockLlm {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(0, StatusCode::INTERNAL_SERVER_ERROR, None, DEFAULT_CONTENT).await
    }

    /// Start a mock server that fails the first `n` requests with 500
    pub async fn start_failing(n: u32) -> anyhow::Result<Self> {
        Self::start_inner(n, StatusCode::INTERNAL_SERVER_ERROR, None, DEFAULT_CONTENT).await
    }

    /// Start a mock server that answers every request with `status`
    pub async fn start_rejecting(status: StatusCode, retry_after: Option<u64>) -> anyhow::Result<Self> {
        Self::start_inner(u32::MAX, status, retry_after, DEFAULT_CONTENT).await
    }

    /// Start a mock server with a custom response content
    pub async fn start_with_response(content: &str) -> anyhow::Result<Self> {
        Self::start_inner(0, StatusCode::INTERNAL_SERVER_ERROR, None, content).await
    }

    async fn start_inner(
        fail_count: u32,
        failure_status: StatusCode,
        retry_after: Option<u64>,
        content: &str,
    ) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            request_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(fail_count),
            failure_status,
            retry_after,
            response_content: content.to_owned(),
            last_request: Mutex::new(None),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1/messages", routing::post(handle_messages))
            .route("/v1beta/models/{action}", routing::post(handle_generate_content))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as an OpenAI-compatible provider
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Base URL for configuring the mock as a Gemini provider
    pub fn gemini_base_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    /// Number of requests received, failed ones included
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// Body of the most recent request
    pub fn last_request(&self) -> Option<Value> {
        self.state.last_request.lock().unwrap().clone()
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl MockLlmState {
    /// Record the request and return the scripted failure, if one is due
    fn receive(&self, body: &Value) -> Option<Response> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap() = Some(body.clone());

        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining == 0 {
            return None;
        }
        if remaining != u32::MAX {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
        }

        let body = Json(json!({
            "error": {
                "message": "mock server intentional failure",
                "type": "server_error"
            }
        }));

        let mut response = (self.failure_status, body).into_response();
        if let Some(secs) = self.retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, secs.into());
        }
        Some(response)
    }
}

fn event_stream(body: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

fn sse_frame(body: &mut String, payload: &Value) {
    body.push_str("data: ");
    body.push_str(&payload.to_string());
    body.push_str("\n\n");
}

// -- OpenAI chat completions --

async fn handle_chat_completions(State(state): State<Arc<MockLlmState>>, Json(req): Json<Value>) -> Response {
    if let Some(failure) = state.receive(&req) {
        return failure;
    }

    let model = req["model"].as_str().unwrap_or_default().to_owned();
    let has_tools = req.get("tools").is_some();

    if req["stream"].as_bool().unwrap_or(false) {
        return openai_stream(&model, &state.response_content, has_tools);
    }

    let (message, finish_reason) = if has_tools {
        (
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_test_123",
                    "type": "function",
                    "function": {
                        "name": "get_weather",
                        "arguments": r#"{"location":"San Francisco"}"#
                    }
                }]
            }),
            "tool_calls",
        )
    } else {
        (json!({"role": "assistant", "content": state.response_content}), "stop")
    };

    Json(json!({
        "id": "chatcmpl-test-123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{"index": 0, "message": message, "finish_reason": finish_reason}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
    .into_response()
}

fn openai_chunk(model: &str, delta: Value, finish_reason: Option<&str>) -> Value {
    json!({
        "id": "chatcmpl-test-stream",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
    })
}

fn openai_stream(model: &str, content: &str, has_tools: bool) -> Response {
    let mut body = String::new();

    if has_tools {
        sse_frame(
            &mut body,
            &openai_chunk(
                model,
                json!({
                    "role": "assistant",
                    "tool_calls": [{
                        "index": 0,
                        "id": "call_test_stream",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": ""}
                    }]
                }),
                None,
            ),
        );
        // Arguments split mid-token, as providers do
        for fragment in [r#"{"locat"#, r#"ion":"San Francisco"}"#] {
            sse_frame(
                &mut body,
                &openai_chunk(
                    model,
                    json!({"tool_calls": [{"index": 0, "function": {"arguments": fragment}}]}),
                    None,
                ),
            );
        }
        sse_frame(&mut body, &openai_chunk(model, json!({}), Some("tool_calls")));
    } else {
        sse_frame(&mut body, &openai_chunk(model, json!({"role": "assistant", "content": ""}), None));
        for word in content.split_whitespace() {
            sse_frame(&mut body, &openai_chunk(model, json!({"content": format!("{word} ")}), None));
        }
        sse_frame(&mut body, &openai_chunk(model, json!({}), Some("stop")));
    }

    // Usage chunk
    sse_frame(
        &mut body,
        &json!({
            "id": "chatcmpl-test-stream",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": model,
            "choices": [],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }),
    );

    // Done marker
    body.push_str("data: [DONE]\n\n");

    event_stream(body)
}

// -- Messages API --

async fn handle_messages(State(state): State<Arc<MockLlmState>>, Json(req): Json<Value>) -> Response {
    if let Some(failure) = state.receive(&req) {
        return failure;
    }

    let model = req["model"].as_str().unwrap_or_default().to_owned();

    if req["stream"].as_bool().unwrap_or(false) {
        return messages_stream(&model, &state.response_content);
    }

    Json(json!({
        "id": "msg_test_123",
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": [
            {"type": "server_tool_use", "id": "srvtoolu_1", "name": "web_search", "input": {"query": "mock"}},
            {"type": "web_search_tool_result", "tool_use_id": "srvtoolu_1", "content": []},
            {"type": "text", "text": state.response_content}
        ],
        "stop_reason": "end_turn",
        "stop_sequence": null,
        "usage": {"input_tokens": 10, "output_tokens": 5}
    }))
    .into_response()
}

fn named_frame(body: &mut String, payload: &Value) {
    let name = payload["type"].as_str().unwrap_or("message");
    body.push_str("event: ");
    body.push_str(name);
    body.push('\n');
    sse_frame(body, payload);
}

fn messages_stream(model: &str, content: &str) -> Response {
    let mut body = String::new();

    named_frame(
        &mut body,
        &json!({"type": "message_start", "message": {
            "id": "msg_test_stream",
            "type": "message",
            "role": "assistant",
            "model": model,
            "content": [],
            "stop_reason": null,
            "stop_sequence": null,
            "usage": {"input_tokens": 10, "output_tokens": 1}
        }}),
    );
    named_frame(&mut body, &json!({"type": "ping"}));
    named_frame(
        &mut body,
        &json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
    );
    for word in content.split_whitespace() {
        let delta = json!({"type": "text_delta", "text": format!("{word} ")});
        named_frame(&mut body, &json!({"type": "content_block_delta", "index": 0, "delta": delta}));
    }
    named_frame(
        &mut body,
        &json!({"type": "content_block_delta", "index": 0, "delta": {
            "type": "citations_delta",
            "citation": {"type": "char_location", "cited_text": "mock", "document_index": 0}
        }}),
    );
    named_frame(&mut body, &json!({"type": "content_block_stop", "index": 0}));
    named_frame(
        &mut body,
        &json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn", "stop_sequence": null},
            "usage": {"output_tokens": 5}
        }),
    );
    named_frame(&mut body, &json!({"type": "message_stop"}));

    event_stream(body)
}

// -- Gemini generateContent --

async fn handle_generate_content(
    State(state): State<Arc<MockLlmState>>,
    Path(action): Path<String>,
    Json(req): Json<Value>,
) -> Response {
    if let Some(failure) = state.receive(&req) {
        return failure;
    }

    let Some((model, method)) = action.split_once(':') else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match method {
        "generateContent" => Json(gemini_response(model, &state.response_content, true)).into_response(),
        "streamGenerateContent" => {
            let mut body = String::new();
            let words: Vec<_> = state.response_content.split_whitespace().collect();
            for (i, word) in words.iter().enumerate() {
                let last = i + 1 == words.len();
                sse_frame(&mut body, &gemini_response(model, &format!("{word} "), last));
            }
            event_stream(body)
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn gemini_response(model: &str, text: &str, finished: bool) -> Value {
    let mut candidate = json!({
        "content": {"role": "model", "parts": [{"text": text}]},
        "index": 0
    });
    let mut response = json!({"modelVersion": model});

    if finished {
        candidate["finishReason"] = json!("STOP");
        response["usageMetadata"] = json!({
            "promptTokenCount": 10,
            "candidatesTokenCount": 5,
            "totalTokenCount": 15
        });
    }

    response["candidates"] = json!([candidate]);
    response
}
