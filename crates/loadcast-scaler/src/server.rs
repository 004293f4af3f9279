//! External scaler gRPC server — timing, streaming, and fail-open glue.
//!
//! Implements the five-method `ExternalScaler` contract. Every upstream
//! call is bounded by a timeout and every failure degrades to the
//! per-operation fallback literal; the orchestrator never sees an RPC
//! error from these operations. Streams tick on their own timers and
//! stop the moment the client disconnects.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use crate::decision::{DrivingMode, SCALER_METRIC_NAME, ScalerConfig, ScalingDecision, decide};
use crate::proto;
use crate::proto::external_scaler_server::ExternalScaler;
use crate::provider::ForecastProvider;

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// gRPC implementation of the external scaler contract.
pub struct ScalerServer {
    provider: Arc<dyn ForecastProvider>,
    config: Arc<ScalerConfig>,
}

impl ScalerServer {
    /// Create a new scaler server over a forecast provider.
    pub fn new(provider: Arc<dyn ForecastProvider>, config: ScalerConfig) -> Self {
        Self {
            provider,
            config: Arc::new(config),
        }
    }

    /// Get the tonic service for mounting on a gRPC server.
    pub fn into_service(self) -> proto::external_scaler_server::ExternalScalerServer<Self> {
        proto::external_scaler_server::ExternalScalerServer::new(self)
    }

    /// Spawn a per-session ticker pushing one message per tick until the
    /// client disconnects. Each tick degrades independently: a failed
    /// forecast maps to the operation's fallback and the next tick retries.
    ///
    /// Streams are forward-looking by contract, so ticks are driven by the
    /// horizon maximum rather than the current value.
    fn spawn_stream<T>(
        &self,
        period: Duration,
        to_message: impl Fn(anyhow::Result<ScalingDecision>) -> T + Send + 'static,
    ) -> ResponseStream<T>
    where
        T: Send + 'static,
    {
        let provider = self.provider.clone();
        let config = self.config.clone();
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let outcome =
                    fetch_decision(&provider, &config, DrivingMode::MaxPredicted).await;
                match &outcome {
                    Ok(d) => {
                        debug!(driving = d.driving_value, active = d.is_active, "stream tick")
                    }
                    Err(e) => {
                        warn!(error = %e, "stream tick: forecast unavailable, degrading to fallback")
                    }
                }
                if tx.send(Ok(to_message(outcome))).await.is_err() {
                    debug!("stream client disconnected, stopping ticker");
                    break;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

/// One bounded trip through the forecasting path. Timeouts, errors, and
/// malformed forecasts all land in the `Err` arm — callers treat them
/// identically.
async fn fetch_decision(
    provider: &Arc<dyn ForecastProvider>,
    config: &ScalerConfig,
    mode: DrivingMode,
) -> anyhow::Result<ScalingDecision> {
    let forecast = tokio::time::timeout(
        config.upstream_timeout,
        provider.forecast(&config.metric_name, config.horizon_minutes),
    )
    .await
    .map_err(|_| anyhow::anyhow!("forecast timed out after {:?}", config.upstream_timeout))??;
    Ok(decide(&forecast, mode, config))
}

fn metrics_response(value: f64) -> proto::GetMetricsResponse {
    proto::GetMetricsResponse {
        metric_values: vec![proto::MetricValue {
            metric_name: SCALER_METRIC_NAME.to_string(),
            metric_value: value as i64,
        }],
    }
}

#[tonic::async_trait]
impl ExternalScaler for ScalerServer {
    type StreamIsActiveStream = ResponseStream<proto::IsActiveResponse>;
    type StreamGetMetricsStream = ResponseStream<proto::GetMetricsResponse>;

    async fn is_active(
        &self,
        _request: Request<proto::ScaledObjectRef>,
    ) -> Result<Response<proto::IsActiveResponse>, Status> {
        let result =
            match fetch_decision(&self.provider, &self.config, DrivingMode::CurrentValue).await {
                Ok(d) => {
                    debug!(driving = d.driving_value, active = d.is_active, "is_active");
                    d.is_active
                }
                Err(e) => {
                    warn!(error = %e, "is_active: forecast unavailable, failing open");
                    true
                }
            };

        Ok(Response::new(proto::IsActiveResponse { result }))
    }

    async fn stream_is_active(
        &self,
        _request: Request<proto::ScaledObjectRef>,
    ) -> Result<Response<Self::StreamIsActiveStream>, Status> {
        info!(period = ?self.config.active_tick, "activity stream opened");
        let stream = self.spawn_stream(self.config.active_tick, |outcome| {
            proto::IsActiveResponse {
                result: outcome.map_or(true, |d| d.is_active),
            }
        });
        Ok(Response::new(stream))
    }

    async fn get_metric_spec(
        &self,
        _request: Request<proto::ScaledObjectRef>,
    ) -> Result<Response<proto::GetMetricSpecResponse>, Status> {
        // Static descriptor: no upstream call.
        Ok(Response::new(proto::GetMetricSpecResponse {
            metric_specs: vec![proto::MetricSpec {
                metric_name: SCALER_METRIC_NAME.to_string(),
                target_size: self.config.target_per_replica as i64,
            }],
        }))
    }

    async fn get_metrics(
        &self,
        _request: Request<proto::GetMetricsRequest>,
    ) -> Result<Response<proto::GetMetricsResponse>, Status> {
        let value =
            match fetch_decision(&self.provider, &self.config, DrivingMode::CurrentValue).await {
                Ok(d) => {
                    info!(
                        driving = d.driving_value,
                        replicas = d.desired_replicas,
                        metric_value = d.metric_value,
                        "get_metrics"
                    );
                    d.metric_value
                }
                Err(e) => {
                    warn!(error = %e, "get_metrics: forecast unavailable, reporting target");
                    self.config.target_per_replica
                }
            };

        Ok(Response::new(metrics_response(value)))
    }

    async fn stream_get_metrics(
        &self,
        _request: Request<proto::GetMetricsRequest>,
    ) -> Result<Response<Self::StreamGetMetricsStream>, Status> {
        info!(period = ?self.config.metrics_tick, "metrics stream opened");
        let config = self.config.clone();
        let stream = self.spawn_stream(self.config.metrics_tick, move |outcome| {
            // Streaming reports the raw driving value; fallback is the target.
            let value = outcome.map_or(config.target_per_replica, |d| d.driving_value);
            metrics_response(value)
        });
        Ok(Response::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    use chrono::Utc;
    use loadcast_forecast::{Forecast, ForecastPoint};
    use tokio_stream::StreamExt;

    /// Canned provider; counts calls so cancellation tests can observe
    /// the ticker stopping.
    struct StubProvider {
        fail: bool,
        current: f64,
        predicted: Vec<f64>,
        delay: Option<Duration>,
        calls: AtomicU64,
    }

    impl StubProvider {
        fn healthy(current: f64, predicted: &[f64]) -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                current,
                predicted: predicted.to_vec(),
                delay: None,
                calls: AtomicU64::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                current: 0.0,
                predicted: vec![],
                delay: None,
                calls: AtomicU64::new(0),
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[tonic::async_trait]
    impl ForecastProvider for StubProvider {
        async fn forecast(&self, _metric: &str, _minutes: u32) -> anyhow::Result<Forecast> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                anyhow::bail!("forecaster unreachable");
            }
            Ok(Forecast {
                current_value: self.current,
                horizon: self
                    .predicted
                    .iter()
                    .map(|&p| ForecastPoint {
                        timestamp: Utc::now(),
                        predicted: p,
                        lower: p,
                        upper: p,
                    })
                    .collect(),
            })
        }
    }

    fn config(tick_ms: u64) -> ScalerConfig {
        ScalerConfig {
            target_per_replica: 10.0,
            min_replicas: 1,
            max_replicas: 20,
            active_tick: Duration::from_millis(tick_ms),
            metrics_tick: Duration::from_millis(tick_ms),
            ..ScalerConfig::default()
        }
    }

    fn server(provider: Arc<StubProvider>) -> ScalerServer {
        ScalerServer::new(provider, config(10))
    }

    fn obj_ref() -> Request<proto::ScaledObjectRef> {
        Request::new(proto::ScaledObjectRef::default())
    }

    fn metrics_req() -> Request<proto::GetMetricsRequest> {
        Request::new(proto::GetMetricsRequest::default())
    }

    fn metric_value(resp: &proto::GetMetricsResponse) -> i64 {
        resp.metric_values[0].metric_value
    }

    #[tokio::test]
    async fn is_active_true_on_healthy_forecast() {
        let srv = server(StubProvider::healthy(0.0, &[]));
        let resp = srv.is_active(obj_ref()).await.unwrap().into_inner();
        // Current-value activity checks never signal scale-to-zero.
        assert!(resp.result);
    }

    #[tokio::test]
    async fn is_active_fails_open() {
        let srv = server(StubProvider::failing());
        let resp = srv.is_active(obj_ref()).await.unwrap().into_inner();
        assert!(resp.result);
    }

    #[tokio::test]
    async fn get_metrics_reports_replica_aligned_value() {
        let srv = server(StubProvider::healthy(95.0, &[]));
        let resp = srv.get_metrics(metrics_req()).await.unwrap().into_inner();
        // floor(95 / 10) + 1 = 10 replicas → 10 * 10 = 100.
        assert_eq!(metric_value(&resp), 100);
    }

    #[tokio::test]
    async fn get_metrics_falls_back_to_target() {
        let srv = server(StubProvider::failing());
        let resp = srv.get_metrics(metrics_req()).await.unwrap().into_inner();
        assert_eq!(metric_value(&resp), 10);
    }

    #[tokio::test]
    async fn metric_spec_is_static() {
        let provider = StubProvider::failing();
        let srv = server(provider.clone());

        let resp = srv.get_metric_spec(obj_ref()).await.unwrap().into_inner();
        assert_eq!(resp.metric_specs.len(), 1);
        assert_eq!(resp.metric_specs[0].metric_name, SCALER_METRIC_NAME);
        assert_eq!(resp.metric_specs[0].target_size, 10);

        // No upstream trip for the spec.
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn upstream_timeout_is_bounded() {
        let provider = Arc::new(StubProvider {
            fail: false,
            current: 95.0,
            predicted: vec![],
            delay: Some(Duration::from_millis(200)),
            calls: AtomicU64::new(0),
        });
        let mut cfg = config(10);
        cfg.upstream_timeout = Duration::from_millis(20);

        let srv = ScalerServer::new(provider, cfg);
        let resp = srv.get_metrics(metrics_req()).await.unwrap().into_inner();
        // Slow upstream is indistinguishable from a failed one.
        assert_eq!(metric_value(&resp), 10);
    }

    #[tokio::test]
    async fn stream_get_metrics_reports_horizon_peak() {
        let srv = server(StubProvider::healthy(2.0, &[5.0, 42.0, 17.0]));
        let mut stream = srv
            .stream_get_metrics(metrics_req())
            .await
            .unwrap()
            .into_inner();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(metric_value(&first), 42);
    }

    #[tokio::test]
    async fn stream_get_metrics_degrades_per_tick() {
        let srv = server(StubProvider::failing());
        let mut stream = srv
            .stream_get_metrics(metrics_req())
            .await
            .unwrap()
            .into_inner();

        // The stream stays open and emits the fallback, tick after tick.
        for _ in 0..3 {
            let msg = stream.next().await.unwrap().unwrap();
            assert_eq!(metric_value(&msg), 10);
        }
    }

    #[tokio::test]
    async fn stream_is_active_follows_the_forecast() {
        let quiet = server(StubProvider::healthy(50.0, &[1.0, 2.0]));
        let mut stream = quiet.stream_is_active(obj_ref()).await.unwrap().into_inner();
        assert!(!stream.next().await.unwrap().unwrap().result);

        let busy = server(StubProvider::healthy(0.0, &[30.0]));
        let mut stream = busy.stream_is_active(obj_ref()).await.unwrap().into_inner();
        assert!(stream.next().await.unwrap().unwrap().result);
    }

    #[tokio::test]
    async fn stream_is_active_fails_open() {
        let srv = server(StubProvider::failing());
        let mut stream = srv.stream_is_active(obj_ref()).await.unwrap().into_inner();
        assert!(stream.next().await.unwrap().unwrap().result);
    }

    #[tokio::test]
    async fn cancelled_stream_stops_ticking() {
        let provider = StubProvider::healthy(1.0, &[1.0]);
        let srv = server(provider.clone());

        let mut stream = srv
            .stream_get_metrics(metrics_req())
            .await
            .unwrap()
            .into_inner();
        stream.next().await.unwrap().unwrap();
        drop(stream);

        // Allow at most one in-flight tick to drain, then the ticker must
        // be gone.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let settled = provider.calls();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(provider.calls(), settled);
    }
}
