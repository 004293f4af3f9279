//! The forecast-provider seam between the scaler and the engine.

use loadcast_forecast::{Forecast, ForecastEngine};

/// Produces forecasts for the scaler. The server treats every error,
/// timeout, or malformed result identically — as "fall back for this
/// call/tick" — so implementations need no internal retry.
#[tonic::async_trait]
pub trait ForecastProvider: Send + Sync + 'static {
    async fn forecast(&self, metric: &str, horizon_minutes: u32) -> anyhow::Result<Forecast>;
}

#[tonic::async_trait]
impl ForecastProvider for ForecastEngine {
    async fn forecast(&self, metric: &str, horizon_minutes: u32) -> anyhow::Result<Forecast> {
        Ok(self.get_forecast(metric, horizon_minutes).await?)
    }
}
