//! Health and readiness surface.
//!
//! Reports whether a model has been trained at least once (from the
//! training-metadata store) and whether the metrics backend answers. A
//! failing backend degrades the status but never fails the endpoint: the
//! forecaster keeps serving from synthetic data.

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};

use loadcast_metrics::MetricsSource;
use loadcast_state::StateStore;

/// Shared state for the health handlers.
#[derive(Clone)]
pub struct HealthState {
    pub store: StateStore,
    pub source: Arc<dyn MetricsSource>,
    /// The metric whose training status is reported.
    pub metric: String,
}

/// Build the HTTP router.
pub fn build_router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// GET / — service banner.
async fn root() -> Json<Value> {
    Json(json!({ "service": "loadcast", "status": "running" }))
}

/// GET /healthz
async fn healthz(State(state): State<HealthState>) -> Json<Value> {
    let model_trained = matches!(state.store.get_training(&state.metric), Ok(Some(_)));
    let metrics_reachable = state.source.instant(&state.metric).await.is_ok();
    let status = if metrics_reachable { "ok" } else { "degraded" };

    Json(json!({
        "status": status,
        "model_trained": model_trained,
        "metrics_reachable": metrics_reachable,
    }))
}
