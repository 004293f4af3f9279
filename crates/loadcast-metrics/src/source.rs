//! The metrics-source seam consumed by the forecasting engine.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetricsResult;

/// A single timestamped sample of the load metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Sample time (UTC).
    pub timestamp: DateTime<Utc>,
    /// Measured value. Non-negative for all supported load metrics.
    pub value: f64,
}

/// Supplies the current value and trailing history of a named metric.
///
/// Implementations must not retry internally: the forecasting engine owns
/// the fallback policy and treats any error as "use synthetic data".
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Instantaneous value of `metric`, aggregated across all emitters.
    async fn instant(&self, metric: &str) -> MetricsResult<f64>;

    /// Ordered historical samples for `metric` over the trailing `lookback`.
    async fn range(&self, metric: &str, lookback: Duration) -> MetricsResult<Vec<MetricSample>>;
}
