//! Forecast output types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One predicted point on the forecast horizon.
///
/// `lower <= predicted <= upper` holds for every point the model emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
}

/// One forecast cycle's output: the live current value plus the predicted
/// horizon at one-minute resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub current_value: f64,
    pub horizon: Vec<ForecastPoint>,
}

impl Forecast {
    /// Largest predicted value on the horizon (0 for an empty horizon).
    pub fn max_predicted(&self) -> f64 {
        self.horizon.iter().map(|p| p.predicted).fold(0.0, f64::max)
    }
}
