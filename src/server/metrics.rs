//! Prometheus metrics for the gateway.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Labels for completed HTTP requests.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub endpoint: String,
    pub status: u16,
}

/// Labels for the request latency histogram (status is unknown at start).
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EndpointLabels {
    pub endpoint: String,
}

/// Container for all Prometheus metrics.
pub struct Metrics {
    registry: Registry,

    /// Counter of HTTP requests by endpoint and status.
    pub http_requests_total: Family<RequestLabels, Counter>,

    /// Histogram of request latency in seconds, up to response headers.
    pub http_request_duration_seconds: Family<EndpointLabels, Histogram>,

    /// Gauge of requests currently being processed.
    pub http_requests_in_flight: Gauge,

    /// Counter of journal entries serialized into response bodies.
    pub entries_streamed_total: Counter,

    /// Counter of unique field values serialized into response bodies.
    pub fields_streamed_total: Counter,

    /// Counter of body bytes handed to the HTTP layer.
    pub bytes_streamed_total: Counter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "http_requests_total",
            "Total number of HTTP requests",
            http_requests_total.clone(),
        );

        // Buckets from 1ms to ~8s
        let http_request_duration_seconds =
            Family::<EndpointLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 14))
            });
        registry.register(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
            http_request_duration_seconds.clone(),
        );

        let http_requests_in_flight = Gauge::default();
        registry.register(
            "http_requests_in_flight",
            "Number of HTTP requests currently being processed",
            http_requests_in_flight.clone(),
        );

        let entries_streamed_total = Counter::default();
        registry.register(
            "gateway_entries_streamed_total",
            "Total number of journal entries serialized into responses",
            entries_streamed_total.clone(),
        );

        let fields_streamed_total = Counter::default();
        registry.register(
            "gateway_fields_streamed_total",
            "Total number of unique field values serialized into responses",
            fields_streamed_total.clone(),
        );

        let bytes_streamed_total = Counter::default();
        registry.register(
            "gateway_bytes_streamed_total",
            "Total number of body bytes produced by the stream generators",
            bytes_streamed_total.clone(),
        );

        Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            entries_streamed_total,
            fields_streamed_total,
            bytes_streamed_total,
        }
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)
            .expect("encoding metrics should not fail");
        buffer
    }
}
