//! loadcast-forecast — demand forecasting for the Loadcast control loop.
//!
//! # Architecture
//!
//! ```text
//! ForecastEngine::get_forecast(metric, horizon)
//!   ├── retrain gate: missing or stale model → refit
//!   │     ├── history: MetricsSource range query over the lookback
//!   │     │     └── unusable or failed → synthetic window (wholesale)
//!   │     └── SeasonalModel::fit → atomic slot swap + TrainingRecord
//!   ├── current value: instant query (0.0 on failure)
//!   └── SeasonalModel::predict_horizon → per-minute points with bounds
//! ```
//!
//! The engine never fails visibly once started: history and current-value
//! errors degrade to synthetic data and zero respectively.

pub mod engine;
pub mod model;
pub mod synthetic;
pub mod types;

pub use engine::{ForecastConfig, ForecastEngine, ForecastError};
pub use model::{ModelError, SeasonalModel};
pub use types::{Forecast, ForecastPoint};
