use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use conduit_config::ClientIdentificationConfig;
use conduit_core::ClientIdentity;
use http::HeaderMap;

/// Middleware that identifies the caller for rate limiting
///
/// Uses the configured header, then the first `x-forwarded-for` address when
/// trusted. Unidentified requests carry no identity and count as `anonymous`.
pub async fn client_id_middleware(config: ClientIdentificationConfig, request: Request, next: Next) -> Response {
    let identity = extract_identity(&config, request.headers());

    let mut request = request;
    if let Some(identity) = identity {
        request.extensions_mut().insert(identity);
    }

    next.run(request).await
}

fn extract_identity(config: &ClientIdentificationConfig, headers: &HeaderMap) -> Option<ClientIdentity> {
    let from_header = headers
        .get(config.header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let from_forwarded = || {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let client_id = match from_header {
        Some(id) => id,
        None if config.trust_forwarded_for => from_forwarded()?,
        None => return None,
    };

    Some(ClientIdentity {
        client_id: client_id.to_owned(),
    })
}
