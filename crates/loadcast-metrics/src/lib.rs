//! loadcast-metrics — the load-metric source consumed by the forecaster.
//!
//! Two queries, both against the Prometheus HTTP API:
//!
//! - an instant query for the current aggregate value of the load metric
//!   (`sum(<metric>)` across all emitting instances), and
//! - a range query for the trailing history window the model trains on.
//!
//! The [`MetricsSource`] trait is the seam the forecasting engine consumes;
//! [`PromClient`] is the production implementation. Failures here are
//! expected and absorbed by the caller (synthetic history, zero current
//! value) — nothing in this crate retries.

pub mod error;
pub mod prom;
pub mod source;

pub use error::{MetricsError, MetricsResult};
pub use prom::PromClient;
pub use source::{MetricSample, MetricsSource};
