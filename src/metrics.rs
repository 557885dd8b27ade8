//! Prometheus metrics collection for Modelgate
//!
//! Tracks request counts, latency, cost, token throughput, and the number
//! of requests currently in flight. Metrics are exposed via the `/metrics`
//! endpoint in Prometheus text format.
//!
//! Labels use the *logical* model name (small/medium) to keep cardinality
//! bounded regardless of which upstream identifiers are configured.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::router::RequestMetadata;

/// Metrics collector for Modelgate
///
/// Cheap to clone; all members are Arc'd or internally reference counted.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    requests_total: IntCounterVec,
    request_latency_ms: HistogramVec,
    cost_usd: HistogramVec,
    tokens_total: IntCounterVec,
    active_requests: IntGauge,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "modelgate_requests_total",
                "Total number of requests processed",
            ),
            &["model", "status_code", "fallback"],
        )?;

        let request_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "modelgate_request_latency_ms",
                "Request latency in milliseconds",
            )
            .buckets(vec![
                10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
            ]),
            &["model"],
        )?;

        let cost_usd = HistogramVec::new(
            HistogramOpts::new("modelgate_cost_usd", "Request cost in USD").buckets(vec![
                0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
            &["model"],
        )?;

        let tokens_total = IntCounterVec::new(
            Opts::new("modelgate_tokens_total", "Total tokens processed"),
            &["model", "type"],
        )?;

        let active_requests = IntGauge::new(
            "modelgate_active_requests",
            "Number of requests currently being processed",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_latency_ms.clone()))?;
        registry.register(Box::new(cost_usd.clone()))?;
        registry.register(Box::new(tokens_total.clone()))?;
        registry.register(Box::new(active_requests.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            request_latency_ms,
            cost_usd,
            tokens_total,
            active_requests,
        })
    }

    /// Track an in-flight request for the lifetime of the returned guard
    ///
    /// The gauge is decremented when the guard drops, so every exit path -
    /// success, fallback, error, panic unwind - releases its slot.
    pub fn track_active_request(&self) -> ActiveRequestGuard {
        self.active_requests.inc();
        ActiveRequestGuard {
            gauge: self.active_requests.clone(),
        }
    }

    /// Current number of in-flight requests (primarily for tests)
    pub fn active_requests(&self) -> i64 {
        self.active_requests.get()
    }

    /// Record a completed (successful or failed) request from its metadata
    pub fn record_completion(&self, metadata: &RequestMetadata, status_code: u16) {
        let model = metadata.selected_model().as_str();
        let fallback = if metadata.fallback_occurred() {
            "true"
        } else {
            "false"
        };

        self.requests_total
            .with_label_values(&[model, &status_code.to_string(), fallback])
            .inc();

        if let Some(latency) = metadata.latency_ms() {
            self.request_latency_ms
                .with_label_values(&[model])
                .observe(latency);
        }

        if metadata.is_successful() {
            if let Some(cost) = metadata.cost_usd() {
                self.cost_usd.with_label_values(&[model]).observe(cost);
            }
            if let Some(tokens) = metadata.tokens_input() {
                self.tokens_total
                    .with_label_values(&[model, "input"])
                    .inc_by(tokens as u64);
            }
            if let Some(tokens) = metadata.tokens_output() {
                self.tokens_total
                    .with_label_values(&[model, "output"])
                    .inc_by(tokens as u64);
            }
        }
    }

    /// Record a request rejected before routing (auth or validation failure)
    pub fn record_rejected(&self, status_code: u16) {
        self.requests_total
            .with_label_values(&["unknown", &status_code.to_string(), "false"])
            .inc();
    }

    /// Render all metrics in Prometheus text exposition format
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            // Observability must never break the serving path
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// RAII guard pairing an increment of the active-request gauge with a
/// guaranteed decrement on drop
pub struct ActiveRequestGuard {
    gauge: IntGauge,
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
