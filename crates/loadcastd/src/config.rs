//! Environment-driven configuration.
//!
//! Every knob is one `LOADCAST_*` variable with a default; unparseable
//! values are fatal at startup, nothing else is.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use loadcast_forecast::ForecastConfig;
use loadcast_scaler::ScalerConfig;

/// Fatal configuration problems. Startup only — once the daemon is up,
/// configuration never changes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Constraint(String),
}

/// Full runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The load metric to forecast.
    pub metric_name: String,
    /// Base URL of the Prometheus instance.
    pub prometheus_url: String,
    /// How far ahead each forecast looks.
    pub horizon_minutes: u32,
    /// History window the model trains on.
    pub history_hours: u32,
    /// Minimum fetched samples for a window to be usable.
    pub min_training_points: usize,
    /// Minimum time between model refits.
    pub retrain_interval_minutes: u64,
    /// Load one replica is expected to absorb.
    pub target_per_replica: f64,
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Bound on each upstream call from the scaler.
    pub upstream_timeout_secs: u64,
    /// StreamIsActive cadence.
    pub active_tick_secs: u64,
    /// StreamGetMetrics cadence.
    pub metrics_tick_secs: u64,
    pub grpc_port: u16,
    pub http_port: u16,
    /// Directory for the training-metadata store.
    pub data_dir: PathBuf,
}

impl Config {
    /// Read configuration from the environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            metric_name: string(&lookup, "LOADCAST_METRIC_NAME", "chat_messages_per_second"),
            prometheus_url: string(&lookup, "LOADCAST_PROMETHEUS_URL", "http://prometheus:9090"),
            horizon_minutes: parse(&lookup, "LOADCAST_FORECAST_HORIZON_MINUTES", 5)?,
            history_hours: parse(&lookup, "LOADCAST_HISTORY_HOURS", 24)?,
            min_training_points: parse(&lookup, "LOADCAST_MIN_TRAINING_POINTS", 10)?,
            retrain_interval_minutes: parse(&lookup, "LOADCAST_RETRAIN_INTERVAL_MINUTES", 10)?,
            target_per_replica: parse(&lookup, "LOADCAST_TARGET_PER_REPLICA", 10.0)?,
            min_replicas: parse(&lookup, "LOADCAST_MIN_REPLICAS", 1)?,
            max_replicas: parse(&lookup, "LOADCAST_MAX_REPLICAS", 20)?,
            upstream_timeout_secs: parse(&lookup, "LOADCAST_UPSTREAM_TIMEOUT_SECS", 5)?,
            active_tick_secs: parse(&lookup, "LOADCAST_ACTIVE_TICK_SECS", 10)?,
            metrics_tick_secs: parse(&lookup, "LOADCAST_METRICS_TICK_SECS", 30)?,
            grpc_port: parse(&lookup, "LOADCAST_GRPC_PORT", 6000)?,
            http_port: parse(&lookup, "LOADCAST_HTTP_PORT", 8001)?,
            data_dir: PathBuf::from(string(&lookup, "LOADCAST_DATA_DIR", "/var/lib/loadcast")),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon_minutes == 0 {
            return Err(ConfigError::Constraint(
                "forecast horizon must be at least one minute".to_string(),
            ));
        }
        if self.history_hours == 0 {
            return Err(ConfigError::Constraint(
                "history lookback must be at least one hour".to_string(),
            ));
        }
        if self.target_per_replica <= 0.0 {
            return Err(ConfigError::Constraint(
                "target per replica must be positive".to_string(),
            ));
        }
        if self.min_replicas > self.max_replicas {
            return Err(ConfigError::Constraint(format!(
                "min replicas {} exceeds max replicas {}",
                self.min_replicas, self.max_replicas
            )));
        }
        Ok(())
    }

    pub fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig {
            lookback_hours: self.history_hours,
            min_training_points: self.min_training_points,
            retrain_interval: Duration::from_secs(self.retrain_interval_minutes * 60),
            synthetic_seed: None,
        }
    }

    pub fn scaler_config(&self) -> ScalerConfig {
        ScalerConfig {
            metric_name: self.metric_name.clone(),
            horizon_minutes: self.horizon_minutes,
            target_per_replica: self.target_per_replica,
            min_replicas: self.min_replicas,
            max_replicas: self.max_replicas,
            upstream_timeout: Duration::from_secs(self.upstream_timeout_secs),
            active_tick: Duration::from_secs(self.active_tick_secs),
            metrics_tick: Duration::from_secs(self.metrics_tick_secs),
        }
    }
}

fn string(lookup: &impl Fn(&str) -> Option<String>, var: &str, default: &str) -> String {
    lookup(var).unwrap_or_else(|| default.to_string())
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(var) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config.metric_name, "chat_messages_per_second");
        assert_eq!(config.horizon_minutes, 5);
        assert_eq!(config.history_hours, 24);
        assert_eq!(config.min_training_points, 10);
        assert_eq!(config.retrain_interval_minutes, 10);
        assert_eq!(config.target_per_replica, 10.0);
        assert_eq!(config.min_replicas, 1);
        assert_eq!(config.max_replicas, 20);
        assert_eq!(config.upstream_timeout_secs, 5);
        assert_eq!(config.active_tick_secs, 10);
        assert_eq!(config.metrics_tick_secs, 30);
    }

    #[test]
    fn each_knob_is_independently_overridable() {
        let config = from_map(&[
            ("LOADCAST_FORECAST_HORIZON_MINUTES", "15"),
            ("LOADCAST_TARGET_PER_REPLICA", "2.5"),
            ("LOADCAST_MAX_REPLICAS", "100"),
        ])
        .unwrap();
        assert_eq!(config.horizon_minutes, 15);
        assert_eq!(config.target_per_replica, 2.5);
        assert_eq!(config.max_replicas, 100);
        // Untouched knobs keep their defaults.
        assert_eq!(config.min_replicas, 1);
    }

    #[test]
    fn junk_values_are_fatal() {
        let err = from_map(&[("LOADCAST_MIN_REPLICAS", "three")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var, .. } if var == "LOADCAST_MIN_REPLICAS"));
    }

    #[test]
    fn inverted_replica_clamp_is_fatal() {
        let err = from_map(&[
            ("LOADCAST_MIN_REPLICAS", "10"),
            ("LOADCAST_MAX_REPLICAS", "2"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Constraint(_)));
    }

    #[test]
    fn zero_horizon_is_fatal() {
        let err = from_map(&[("LOADCAST_FORECAST_HORIZON_MINUTES", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Constraint(_)));
    }

    #[test]
    fn derived_configs_carry_the_knobs() {
        let config = from_map(&[
            ("LOADCAST_HISTORY_HOURS", "48"),
            ("LOADCAST_RETRAIN_INTERVAL_MINUTES", "3"),
            ("LOADCAST_METRICS_TICK_SECS", "7"),
        ])
        .unwrap();

        let forecast = config.forecast_config();
        assert_eq!(forecast.lookback_hours, 48);
        assert_eq!(forecast.retrain_interval, Duration::from_secs(180));

        let scaler = config.scaler_config();
        assert_eq!(scaler.metrics_tick, Duration::from_secs(7));
        assert_eq!(scaler.metric_name, "chat_messages_per_second");
    }
}
