//! HTTP server assembly for Conduit

mod client_id;
mod health;
mod request_context;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use conduit_config::Config;
use conduit_llm::Pipeline;
use tower_http::trace::TraceLayer;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    pipeline: Arc<Pipeline>,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline or rate-limiter construction fails
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut pipeline = Pipeline::from_config(config)?;

        if let Some(ref rl_config) = config.server.rate_limit {
            let limiter = conduit_ratelimit::create_limiter(rl_config)?;
            pipeline = pipeline.with_rate_limiter(Arc::new(limiter));
        }

        let pipeline = Arc::new(pipeline);
        let mut app = Router::new();

        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(health::health_handler));
        }

        app = app.merge(conduit_llm::llm_router(Arc::clone(&pipeline)));

        // Apply middleware layers (innermost first)

        // Request context, reads the identity stored by the layer below
        app = app.layer(axum::middleware::from_fn(request_context::request_context_middleware));

        // Client identification
        let cid_config = config.server.client_identification.clone();
        app = app.layer(axum::middleware::from_fn(move |req, next| {
            let config = cid_config.clone();
            async move { client_id::client_id_middleware(config, req, next).await }
        }));

        // Tracing
        app = app.layer(TraceLayer::new_for_http());

        Ok(Self {
            router: app,
            listen_address: config.server.listen_address(),
            pipeline,
        })
    }

    /// Override the configured listen address
    #[must_use]
    pub const fn with_listen_address(mut self, listen_address: SocketAddr) -> Self {
        self.listen_address = listen_address;
        self
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Pipeline serving requests, for configuration reloads
    #[must_use]
    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, StatusCode};
    use indoc::indoc;
    use tower::ServiceExt;

    use super::*;

    fn config(extra: &str) -> Config {
        let base = indoc! {r#"
            [llm.providers.local]
            type = "openai"
            base_url = "http://127.0.0.1:1/v1"

            [llm.routes.default]
            provider = "local"
            model = "gpt-4o"

            [llm.retry]
            max_attempts = 1
        "#};
        Config::parse(&format!("{extra}\n{base}")).unwrap()
    }

    #[tokio::test]
    async fn serves_health() {
        let router = Server::new(&config("")).unwrap().into_router();

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_can_be_disabled() {
        let config = config(indoc! {r#"
            [server.health]
            enabled = false
        "#});
        let router = Server::new(&config).unwrap().into_router();

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rate_limit_applies_per_client() {
        let config = config(indoc! {r#"
            [server.rate_limit]
            requests = 1
            window = "1m"
        "#});
        let router = Server::new(&config).unwrap().into_router();

        let request = |key: &'static str| {
            Request::post("/v1/messages")
                .header("x-api-key", key)
                .body(Body::from(r#"{"model": "m", "messages": [{"role": "user", "content": "hi"}]}"#))
                .unwrap()
        };

        // The first request is admitted and fails upstream, the second is refused
        let first = router.clone().oneshot(request("a")).await.unwrap();
        assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);

        let second = router.clone().oneshot(request("a")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()["retry-after"], "60");

        let other = router.oneshot(request("b")).await.unwrap();
        assert_ne!(other.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
