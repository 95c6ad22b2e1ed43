//! # Prometheus Metrics — Exposition for Scraping
//!
//! Exposes facsys operational metrics in the Prometheus text exposition format.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `facsys_connector_requests_total` | Counter | `connector`, `operation`, `outcome` | Row-store calls by result |
//! | `facsys_connector_request_duration_seconds` | Histogram | `operation` | Row-store call latency |
//! | `facsys_inspections_submitted_total` | Counter | `scope`, `kind`, `outcome` | Per-equipment submission outcomes |
//! | `facsys_completion_percent` | Gauge | `scope`, `kind` | Last computed completion per dashboard tile |
//! | `facsys_connector_state` | Gauge | — | 0 unconfigured, 1 untested, 2 connected, 3 degraded |
//! | `facsys_http_request_duration_seconds` | Histogram | `method`, `path` | API latency |
//!
//! The `/metrics` endpoint renders the current registry state on each scrape.

use crate::connector::ConnectionState;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ConnectorLabel {
    pub connector: String,
    pub operation: String,
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabel {
    pub operation: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SubmissionLabel {
    pub scope: String,
    pub kind: String,
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TileLabel {
    pub scope: String,
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

type HistogramFamily<L> = Family<L, Histogram, fn() -> Histogram>;

fn connector_buckets() -> Histogram {
    Histogram::new(exponential_buckets(0.05, 2.0, 10))
}

fn http_buckets() -> Histogram {
    Histogram::new(exponential_buckets(0.005, 2.0, 12))
}

/// Thread-safe metrics registry. Safe to update from any task.
pub struct Metrics {
    pub registry: Registry,
    pub connector_requests: Family<ConnectorLabel, Counter>,
    pub connector_request_duration: HistogramFamily<OperationLabel>,
    pub inspections_submitted: Family<SubmissionLabel, Counter>,
    pub completion_percent: Family<TileLabel, Gauge>,
    pub connector_state: Gauge,
    pub http_request_duration: HistogramFamily<HttpLabel>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let connector_requests = Family::<ConnectorLabel, Counter>::default();
        registry.register(
            "facsys_connector_requests",
            "Row-store calls by connector, operation and outcome",
            connector_requests.clone(),
        );

        let connector_request_duration: HistogramFamily<OperationLabel> =
            Family::new_with_constructor(connector_buckets);
        registry.register(
            "facsys_connector_request_duration_seconds",
            "Row-store call latency",
            connector_request_duration.clone(),
        );

        let inspections_submitted = Family::<SubmissionLabel, Counter>::default();
        registry.register(
            "facsys_inspections_submitted",
            "Per-equipment submission outcomes",
            inspections_submitted.clone(),
        );

        let completion_percent = Family::<TileLabel, Gauge>::default();
        registry.register(
            "facsys_completion_percent",
            "Last computed completion percentage per dashboard tile",
            completion_percent.clone(),
        );

        let connector_state = Gauge::default();
        registry.register(
            "facsys_connector_state",
            "Connection state of the configured row-store",
            connector_state.clone(),
        );

        let http_request_duration: HistogramFamily<HttpLabel> =
            Family::new_with_constructor(http_buckets);
        registry.register(
            "facsys_http_request_duration_seconds",
            "HTTP API request latency",
            http_request_duration.clone(),
        );

        Self {
            registry,
            connector_requests,
            connector_request_duration,
            inspections_submitted,
            completion_percent,
            connector_state,
            http_request_duration,
        }
    }

    pub fn record_state(&self, state: ConnectionState) {
        let value = match state {
            ConnectionState::Unconfigured => 0,
            ConnectionState::Untested => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Degraded => 3,
        };
        self.connector_state.set(value);
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        encode(&mut buf, &self.registry).expect("encoding metrics should not fail");
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
