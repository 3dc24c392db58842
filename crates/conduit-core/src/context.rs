use http::HeaderMap;
use tokio_util::sync::CancellationToken;

/// Header carrying an explicit route alias chosen by the client
pub const ROUTE_HINT_HEADER: &str = "x-conduit-route";

/// Client id used when nothing on the request identifies the caller
const ANONYMOUS_CLIENT: &str = "anonymous";

/// Runtime context for a single gateway request
///
/// Carries the inbound HTTP parts, the resolved caller identity and the
/// cancellation signal that is tripped when the client goes away.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP request parts (method, URI, headers, extensions)
    pub parts: http::request::Parts,
    /// Client identity for rate limiting
    pub client_identity: Option<ClientIdentity>,
    /// Cancelled on client disconnect or shutdown
    pub cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a minimal context for embedded (non-HTTP) use
    ///
    /// Contains empty headers, no client identity and a fresh
    /// cancellation token
    pub fn empty() -> Self {
        let (parts, ()) = http::Request::new(()).into_parts();

        Self {
            parts,
            client_identity: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Replace the cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Access request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Route alias requested through the `x-conduit-route` header
    pub fn route_hint(&self) -> Option<&str> {
        self.headers()
            .get(ROUTE_HINT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Identifier used for rate limiting, `anonymous` when unknown
    pub fn client_id(&self) -> &str {
        self.client_identity
            .as_ref()
            .map_or(ANONYMOUS_CLIENT, |identity| identity.client_id.as_str())
    }
}

/// Identified caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Client identifier (API key, forwarded address, ...)
    pub client_id: String,
}
