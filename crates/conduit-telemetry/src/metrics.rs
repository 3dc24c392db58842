//! Metric names and the gateway's instruments

use std::sync::LazyLock;
use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{KeyValue, global};

/// Instrumentation scope for every gateway instrument
pub const METER_NAME: &str = "conduit";

/// Upstream latency, seconds (time to headers for streams)
pub const PROVIDER_LATENCY: &str = "conduit.provider.latency";
/// Route decisions by alias, provider and reason
pub const ROUTE_DECISIONS: &str = "conduit.route.decisions";

/// Instruments recorded by the request pipeline
pub struct GatewayMetrics {
    provider_latency: Histogram<f64>,
    route_decisions: Counter<u64>,
}

impl GatewayMetrics {
    fn new() -> Self {
        let meter = global::meter(METER_NAME);

        Self {
            provider_latency: meter
                .f64_histogram(PROVIDER_LATENCY)
                .with_unit("s")
                .with_description("Latency of upstream provider calls")
                .build(),
            route_decisions: meter
                .u64_counter(ROUTE_DECISIONS)
                .with_description("Routing decisions by alias and reason")
                .build(),
        }
    }

    /// Record one upstream call
    pub fn record_provider_latency(
        &self,
        provider: &str,
        model: &str,
        status: &'static str,
        streaming: bool,
        latency: Duration,
    ) {
        self.provider_latency.record(
            latency.as_secs_f64(),
            &[
                KeyValue::new("provider", provider.to_owned()),
                KeyValue::new("model", model.to_owned()),
                KeyValue::new("status", status),
                KeyValue::new("streaming", streaming),
            ],
        );
    }

    /// Count one routing decision
    pub fn count_route_decision(&self, alias: &str, provider: &str, reason: &'static str) {
        self.route_decisions.add(
            1,
            &[
                KeyValue::new("alias", alias.to_owned()),
                KeyValue::new("provider", provider.to_owned()),
                KeyValue::new("reason", reason),
            ],
        );
    }
}

static GATEWAY: LazyLock<GatewayMetrics> = LazyLock::new(GatewayMetrics::new);

/// Process-wide instruments, bound to the meter provider installed by [`crate::init`]
///
/// Instruments are created on first use, so `init` must run before the first request.
pub fn gateway() -> &'static GatewayMetrics {
    &GATEWAY
}
