//! Pure scaling decision core.
//!
//! Converts a forecast into a clamped desired-replica count and the
//! orchestrator-facing metric value. No I/O, no timing: the server layer
//! feeds it forecasts and picks which projection to report.

use std::time::Duration;

use loadcast_forecast::Forecast;

/// The metric identifier this scaler reports to the orchestrator.
pub const SCALER_METRIC_NAME: &str = "predicted_load";

/// Scaler tuning: clamps, target, and server cadences.
#[derive(Debug, Clone)]
pub struct ScalerConfig {
    /// The load metric the forecaster is asked about.
    pub metric_name: String,
    /// How far ahead each upstream forecast looks.
    pub horizon_minutes: u32,
    /// Load one replica is expected to absorb.
    pub target_per_replica: f64,
    /// Replica clamp, lower end.
    pub min_replicas: u32,
    /// Replica clamp, upper end.
    pub max_replicas: u32,
    /// Bound on each upstream forecast call.
    pub upstream_timeout: Duration,
    /// Cadence of StreamIsActive ticks.
    pub active_tick: Duration,
    /// Cadence of StreamGetMetrics ticks.
    pub metrics_tick: Duration,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            metric_name: "chat_messages_per_second".to_string(),
            horizon_minutes: 5,
            target_per_replica: 10.0,
            min_replicas: 1,
            max_replicas: 20,
            upstream_timeout: Duration::from_secs(5),
            active_tick: Duration::from_secs(10),
            metrics_tick: Duration::from_secs(30),
        }
    }
}

/// Which scalar from the forecast drives the decision.
///
/// The immediate (polling) operations are driven by the live current
/// value, the forward-looking streams by the horizon maximum. The two
/// modes also differ in how they report activity; see [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrivingMode {
    CurrentValue,
    MaxPredicted,
}

/// A scaling decision derived from one forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingDecision {
    /// Clamped replica count the driving value asks for.
    pub desired_replicas: u32,
    /// The raw scalar that drove the decision.
    pub driving_value: f64,
    /// Replica-aligned metric value: `desired_replicas * target`. Reported
    /// by the polling GetMetrics; the streams report `driving_value`.
    pub metric_value: f64,
    /// Whether the workload should be considered active.
    pub is_active: bool,
}

/// Derive a decision from a successful forecast.
///
/// `desired = clamp(min, max, floor(driving / target) + 1)`. Under
/// `CurrentValue` mode the workload is always reported active so an
/// immediate check can never trigger premature scale-to-zero; under
/// `MaxPredicted` mode activity follows the forecast, letting a stream
/// signal inactivity ahead of a predicted lull.
pub fn decide(forecast: &Forecast, mode: DrivingMode, config: &ScalerConfig) -> ScalingDecision {
    let driving = match mode {
        DrivingMode::CurrentValue => forecast.current_value,
        DrivingMode::MaxPredicted => forecast.max_predicted(),
    };

    let desired = ((driving / config.target_per_replica).floor() + 1.0)
        .clamp(f64::from(config.min_replicas), f64::from(config.max_replicas))
        as u32;

    let is_active = match mode {
        DrivingMode::CurrentValue => true,
        DrivingMode::MaxPredicted => driving > config.target_per_replica,
    };

    ScalingDecision {
        desired_replicas: desired,
        driving_value: driving,
        metric_value: f64::from(desired) * config.target_per_replica,
        is_active,
    }
}
