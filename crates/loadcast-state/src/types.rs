//! Domain types persisted by the state store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata about the most recent model training for one metric.
///
/// Written by the retrain path after each successful model swap, read by
/// the health surface. The trained model itself is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    /// The load metric the model was trained for.
    pub metric: String,
    /// When training completed.
    pub trained_at: DateTime<Utc>,
    /// How many history samples the model was fitted on.
    pub training_points: usize,
}
