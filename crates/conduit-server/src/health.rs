/// Liveness check, answers without touching any provider
pub async fn health_handler() -> &'static str {
    "ok"
}
