//! Graphite-compatible time series query service.
//!
//! Metrics are stored as fixed-step point sets partitioned by retention
//! tier and time slot. Queries are Graphite target expressions: metric name
//! patterns with `{a,b}` alternation, wrapped in function calls such as
//! `alias(servers.{web1,web2}.cpu, "cpu")` or `sumSeries(...)`.
//!
//! # Architecture
//!
//! - [`partition::select`] maps a time range onto a retention tier and the
//!   physical partitions covering it.
//! - The fetch engine expands names, splits them into bounded batches and
//!   reads every (partition, batch) unit in parallel from a
//!   [`storage::Backend`], merging the results into one [`model::SeriesMap`].
//! - [`query::parse`] turns a target into an [`query::Expr`] tree, and the
//!   [`query::Evaluator`] walks it against a [`storage::Store`], resolving
//!   function calls through a [`query::FunctionRegistry`].
//! - [`server`] exposes `/render`, `/datapoints` and friends over HTTP.
//!
//! Every parallel fan-out joins all of its tasks before returning, on
//! success and on error alike.

pub mod config;
pub mod error;
mod fanout;
pub mod model;
pub mod names;
pub mod partition;
pub mod query;
pub mod server;
pub mod storage;
#[cfg(test)]
mod test_utils;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod timeparser;

pub use config::{CliArgs, Config, FetchConfig, load_config};
pub use error::{Error, Result};
pub use model::{DataPoint, Metric, Sample, Series, SeriesMap};
pub use query::{Evaluator, Expr, FunctionRegistry, parse};
pub use storage::{BackendStore, KvBackend, PointsMergeOperator, Store};
