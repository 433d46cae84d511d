//! # Prometheus Metrics
//!
//! Exposes plantkeeper operational metrics in the Prometheus text exposition
//! format, rendered by `GET /metrics`.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `plantkeeper_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency by normalized path |
//! | `plantkeeper_external_calls_total` | Counter | `api`, `outcome` | Outbound plant-info and text-generation calls |

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ExternalCallLabel {
    pub api: String,
    /// `success` or `failure`.
    pub outcome: String,
}

pub struct Metrics {
    pub registry: Registry,
    pub http_request_duration: Family<HttpLabel, Histogram>,
    pub external_calls: Family<ExternalCallLabel, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_request_duration =
            Family::<HttpLabel, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.005, 2.0, 12))
            });
        registry.register(
            "plantkeeper_http_request_duration_seconds",
            "HTTP request latency by method and normalized path",
            http_request_duration.clone(),
        );

        let external_calls = Family::<ExternalCallLabel, Counter>::default();
        registry.register(
            "plantkeeper_external_calls",
            "Outbound plant-info and text-generation calls by outcome",
            external_calls.clone(),
        );

        Self {
            registry,
            http_request_duration,
            external_calls,
        }
    }

    pub fn record_external_call(&self, api: &str, success: bool) {
        self.external_calls
            .get_or_create(&ExternalCallLabel {
                api: api.to_string(),
                outcome: if success { "success" } else { "failure" }.to_string(),
            })
            .inc();
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            tracing::error!(error = %e, "failed to encode metrics");
        }
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
