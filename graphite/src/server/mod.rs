//! HTTP surface: render, write, health and metrics endpoints.

mod error;
mod handlers;
mod http;
mod metrics;
mod middleware;
mod request;

pub use handlers::AppState;
pub use http::{GraphiteServer, build_router};
pub use metrics::Metrics;
