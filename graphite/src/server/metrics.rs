//! Prometheus metrics for the graphite server.

use axum::http::Method;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

/// Labels for render request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RenderLabels {
    pub status: OperationStatus,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum OperationStatus {
    Success,
    Error,
}

/// Labels for HTTP request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabelsWithStatus {
    pub method: HttpMethod,
    pub endpoint: String,
    pub status: u16,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HttpMethod {
    Get,
    Post,
    Other,
}

impl From<&Method> for HttpMethod {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => HttpMethod::Get,
            Method::POST => HttpMethod::Post,
            _ => HttpMethod::Other,
        }
    }
}

/// Container for all Prometheus metrics.
pub struct Metrics {
    registry: Registry,

    pub http_requests_total: Family<HttpLabelsWithStatus, Counter>,

    /// Targets evaluated, by outcome of the request they belonged to.
    pub render_targets_total: Family<RenderLabels, Counter>,

    pub datapoints_written_total: Counter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests_total = Family::<HttpLabelsWithStatus, Counter>::default();
        registry.register(
            "http_requests_total",
            "Total number of HTTP requests",
            http_requests_total.clone(),
        );

        let render_targets_total = Family::<RenderLabels, Counter>::default();
        registry.register(
            "render_targets_total",
            "Total number of render targets evaluated by status",
            render_targets_total.clone(),
        );

        let datapoints_written_total = Counter::default();
        registry.register(
            "datapoints_written_total",
            "Total number of datapoints written",
            datapoints_written_total.clone(),
        );

        Self {
            registry,
            http_requests_total,
            render_targets_total,
            datapoints_written_total,
        }
    }

    pub fn record_render(&self, targets: usize, status: OperationStatus) {
        self.render_targets_total
            .get_or_create(&RenderLabels { status })
            .inc_by(targets as u64);
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}
