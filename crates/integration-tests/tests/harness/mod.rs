//! Shared fixtures for the integration tests
//!
//! Each test binary uses a different subset of the harness.
#![allow(dead_code)]

pub mod config;
pub mod mock_llm;
pub mod server;

/// Minimal Messages API request body
pub fn messages_body(model: &str, content: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "max_tokens": 256,
        "messages": [{"role": "user", "content": content}]
    })
}

/// Split an SSE body into `(event, data)` pairs
pub fn parse_sse(text: &str) -> Vec<(String, serde_json::Value)> {
    text.split("\n\n")
        .filter_map(|frame| {
            let mut name = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    name = Some(value.trim().to_owned());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data = serde_json::from_str(value.trim()).ok();
                }
            }
            Some((name?, data?))
        })
        .collect()
}
