use std::time::Duration;

use conduit_core::HttpError;
use http::StatusCode;
use thiserror::Error;

/// Canonical error taxonomy for the gateway pipeline
///
/// Every failure leaving the pipeline is one of these kinds, regardless of
/// which provider or codec produced it.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Client sent a malformed or invalid request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Resolved provider cannot express a requested feature
    #[error("provider '{provider}' does not support {capability}")]
    CapabilityUnsupported {
        /// Provider the request was routed to
        provider: String,
        /// Feature that cannot be expressed (e.g. "tools")
        capability: &'static str,
    },

    /// Request does not fit the provider's budget even after clamping
    #[error("request too large: estimated {estimated} tokens exceeds the limit of {limit}")]
    RequestTooLarge {
        /// Estimated prompt tokens
        estimated: u32,
        /// Provider context window
        limit: u32,
    },

    /// Client has exceeded their rate limit
    #[error("rate limit exceeded")]
    RateLimited {
        /// Time until the client may retry
        retry_after: Duration,
    },

    /// No reachable provider for the resolved route
    #[error("no available provider for {target}")]
    ProviderUnavailable {
        /// Alias or provider that could not be served
        target: String,
    },

    /// Provider failed or returned something unusable
    #[error("upstream error from {provider}: {message}")]
    Upstream {
        /// Provider that failed
        provider: String,
        /// HTTP status, when the provider answered
        status: Option<u16>,
        /// Normalized provider message
        message: String,
    },

    /// Client went away or the request was aborted
    #[error("request canceled")]
    Canceled,
}

impl LlmError {
    /// Build an upstream error without a status code
    pub fn upstream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Whether the failure is transient and worth another attempt
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => match status {
                Some(code) => *code >= 500,
                None => true,
            },
            Self::ProviderUnavailable { .. } => true,
            _ => false,
        }
    }

    /// Whether the failure says something about provider health
    pub const fn counts_against_provider(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::ProviderUnavailable { .. })
    }
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::CapabilityUnsupported { .. } => StatusCode::BAD_REQUEST,
            Self::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ProviderUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            // Client closed request
            Self::Canceled => StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT),
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::CapabilityUnsupported { .. } => "capability_unsupported_error",
            Self::RequestTooLarge { .. } => "request_too_large",
            Self::RateLimited { .. } => "rate_limit_error",
            Self::ProviderUnavailable { .. } => "overloaded_error",
            Self::Upstream { .. } => "api_error",
            Self::Canceled => "canceled",
        }
    }

    fn client_message(&self) -> String {
        self.to_string()
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_server_side_failures_retry() {
        let server = LlmError::Upstream {
            provider: "p".to_owned(),
            status: Some(503),
            message: "unavailable".to_owned(),
        };
        let client = LlmError::Upstream {
            provider: "p".to_owned(),
            status: Some(401),
            message: "bad key".to_owned(),
        };

        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(LlmError::upstream("p", "connection reset").is_retryable());
        assert!(!LlmError::InvalidRequest("x".to_owned()).is_retryable());
        assert!(!LlmError::Canceled.is_retryable());
    }

    #[test]
    fn rate_limit_rounds_retry_after_up() {
        let err = LlmError::RateLimited {
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.retry_after(), Some(2));

        let short = LlmError::RateLimited {
            retry_after: Duration::from_millis(10),
        };
        assert_eq!(short.retry_after(), Some(1));
    }

    #[test]
    fn canceled_maps_to_client_closed() {
        assert_eq!(LlmError::Canceled.status_code().as_u16(), 499);
        assert_eq!(LlmError::Canceled.error_type(), "canceled");
    }
}
