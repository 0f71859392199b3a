use crate::api::WatchAppState;
use crate::error::WatchError;
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;

/// Health response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub upstream_available: bool,
    pub entities: usize,
    pub subscriptions: usize,
    pub events_processed: u64,
}

pub fn create_health_router(state: Arc<WatchAppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .with_state(state)
}

/// GET /api/health - 503 while the upstream source is disconnected
async fn health(
    State(state): State<Arc<WatchAppState>>,
) -> Result<Json<HealthResponse>, WatchError> {
    state.engine.ensure_upstream()?;

    Ok(Json(HealthResponse {
        upstream_available: true,
        entities: state.engine.entity_count(),
        subscriptions: state.engine.subscription_count(),
        events_processed: state.engine.events_processed(),
    }))
}
