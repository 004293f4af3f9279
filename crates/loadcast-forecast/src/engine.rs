//! ForecastEngine — retrain gating, history acquisition, prediction.
//!
//! One live model per metric, held in a slot behind an `RwLock` and
//! replaced atomically after each refit. A per-metric retrain mutex keeps
//! at most one refit in flight; concurrent callers that lose the race
//! reuse the winner's model.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use loadcast_metrics::{MetricSample, MetricsSource};
use loadcast_state::{StateStore, TrainingRecord};

use crate::model::{ModelError, SeasonalModel};
use crate::synthetic;
use crate::types::Forecast;

/// Tuning knobs for the forecasting engine.
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    /// History window the model trains on.
    pub lookback_hours: u32,
    /// Minimum fetched samples for a window to be usable.
    pub min_training_points: usize,
    /// Minimum time between refits of the live model.
    pub retrain_interval: Duration,
    /// Fixed seed for the synthetic generator; entropy-seeded when unset.
    pub synthetic_seed: Option<u64>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            min_training_points: 10,
            retrain_interval: Duration::from_secs(10 * 60),
            synthetic_seed: None,
        }
    }
}

/// Errors surfaced by the forecasting engine.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Neither live history nor the synthetic fallback produced a
    /// trainable window. The fallback is pure computation with a fixed
    /// minimum size, so this is not reachable in practice.
    #[error("no trainable history for {metric}: {source}")]
    UpstreamUnavailable {
        metric: String,
        #[source]
        source: ModelError,
    },
}

/// Per-metric model slot: the live model plus a retrain guard.
struct ModelSlot {
    model: RwLock<Option<Arc<SeasonalModel>>>,
    retrain: Mutex<()>,
}

impl ModelSlot {
    fn new() -> Self {
        Self {
            model: RwLock::new(None),
            retrain: Mutex::new(()),
        }
    }
}

/// Owns the live models and produces horizon forecasts on demand.
pub struct ForecastEngine {
    source: Arc<dyn MetricsSource>,
    state: StateStore,
    config: ForecastConfig,
    slots: RwLock<HashMap<String, Arc<ModelSlot>>>,
}

impl ForecastEngine {
    /// Create an engine over the given metrics source and state store.
    pub fn new(source: Arc<dyn MetricsSource>, state: StateStore, config: ForecastConfig) -> Self {
        Self {
            source,
            state,
            config,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Forecast `horizon_minutes` of `metric` at one-minute resolution.
    ///
    /// Retrains first when the live model is missing or stale; the caller
    /// observes that latency. History and current-value failures are
    /// absorbed (synthetic window, zero value) rather than surfaced.
    pub async fn get_forecast(
        &self,
        metric: &str,
        horizon_minutes: u32,
    ) -> Result<Forecast, ForecastError> {
        let slot = self.slot(metric).await;

        let model = match self.model_if_fresh(&slot).await {
            Some(model) => model,
            None => self.retrain(metric, &slot).await?,
        };

        // Independent of the model; a failed fetch must never block the
        // forecast.
        let current_value = match self.source.instant(metric).await {
            Ok(v) => v,
            Err(e) => {
                warn!(%metric, error = %e, "current value fetch failed, substituting 0");
                0.0
            }
        };

        let horizon = model.predict_horizon(Utc::now(), horizon_minutes);
        debug!(%metric, points = horizon.len(), current_value, "forecast produced");

        Ok(Forecast {
            current_value,
            horizon,
        })
    }

    /// When the live model for `metric` was trained, if one exists.
    pub async fn trained_at(&self, metric: &str) -> Option<DateTime<Utc>> {
        let slot = self.slots.read().await.get(metric)?.clone();
        let model = slot.model.read().await.clone()?;
        Some(model.trained_at())
    }

    /// Get or create the slot for a metric.
    async fn slot(&self, metric: &str) -> Arc<ModelSlot> {
        if let Some(slot) = self.slots.read().await.get(metric) {
            return slot.clone();
        }
        let mut slots = self.slots.write().await;
        slots
            .entry(metric.to_string())
            .or_insert_with(|| Arc::new(ModelSlot::new()))
            .clone()
    }

    /// The live model, unless it is missing or past the retrain interval.
    async fn model_if_fresh(&self, slot: &ModelSlot) -> Option<Arc<SeasonalModel>> {
        let model = slot.model.read().await.clone()?;
        let age = Utc::now()
            .signed_duration_since(model.trained_at())
            .to_std()
            .unwrap_or_default();
        (age <= self.config.retrain_interval).then_some(model)
    }

    /// Refit the model for `metric`, serialized per metric.
    async fn retrain(
        &self,
        metric: &str,
        slot: &ModelSlot,
    ) -> Result<Arc<SeasonalModel>, ForecastError> {
        let _guard = slot.retrain.lock().await;

        // Another caller may have finished a refit while we waited.
        if let Some(model) = self.model_if_fresh(slot).await {
            return Ok(model);
        }

        let window = self.acquire_history(metric).await;
        let trained_at = Utc::now();
        let model = Arc::new(SeasonalModel::fit(&window, trained_at).map_err(|source| {
            ForecastError::UpstreamUnavailable {
                metric: metric.to_string(),
                source,
            }
        })?);

        *slot.model.write().await = Some(model.clone());
        info!(%metric, points = window.len(), "model trained");

        let record = TrainingRecord {
            metric: metric.to_string(),
            trained_at,
            training_points: window.len(),
        };
        if let Err(e) = self.state.put_training(&record) {
            // Health reporting degrades but the forecast stays usable.
            warn!(%metric, error = %e, "failed to persist training record");
        }

        Ok(model)
    }

    /// Fetch the training window, replacing it wholesale with synthetic
    /// data when the fetch fails or the window is unusable.
    async fn acquire_history(&self, metric: &str) -> Vec<MetricSample> {
        let lookback = Duration::from_secs(u64::from(self.config.lookback_hours) * 3600);
        match self.source.range(metric, lookback).await {
            Ok(samples) if window_is_usable(&samples, self.config.min_training_points) => {
                debug!(%metric, points = samples.len(), "using fetched history");
                samples
            }
            Ok(samples) => {
                warn!(
                    %metric,
                    points = samples.len(),
                    "history window unusable, generating synthetic window"
                );
                self.synthetic_window()
            }
            Err(e) => {
                warn!(%metric, error = %e, "history fetch failed, generating synthetic window");
                self.synthetic_window()
            }
        }
    }

    fn synthetic_window(&self) -> Vec<MetricSample> {
        let mut rng = match self.config.synthetic_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        synthetic::synthetic_window(Utc::now(), self.config.lookback_hours, &mut rng)
    }
}

/// A fetched window is usable when it has enough points, strictly
/// increasing timestamps, and finite non-negative values.
fn window_is_usable(samples: &[MetricSample], min_points: usize) -> bool {
    samples.len() >= min_points
        && samples.iter().all(|s| s.value.is_finite() && s.value >= 0.0)
        && samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}
