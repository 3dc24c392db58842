use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use conduit_core::RequestContext;
use tokio_util::sync::CancellationToken;

/// Middleware that constructs a `RequestContext` from the incoming request
///
/// Picks up the identity stored by the client identification layer and gives
/// the request a fresh cancellation token.
pub async fn request_context_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let context = RequestContext {
        parts: parts.clone(),
        client_identity: parts.extensions.get().cloned(),
        cancellation: CancellationToken::new(),
    };

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(context);

    next.run(request).await
}
