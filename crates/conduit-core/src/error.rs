use http::StatusCode;

/// Error that knows how it is rendered to API clients
///
/// Domain crates implement this; only the HTTP layer turns it into a
/// response, as `{"type": "error", "error": {"type", "message"}}`.
pub trait HttpError: std::error::Error {
    fn status_code(&self) -> StatusCode;

    /// Value of `error.type` in the response body
    fn error_type(&self) -> &str;

    /// Value of `error.message`, never containing secrets
    fn client_message(&self) -> String;

    /// `retry-after` header in whole seconds
    fn retry_after(&self) -> Option<u64> {
        None
    }
}
