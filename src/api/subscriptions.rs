use crate::api::WatchAppState;
use crate::error::WatchError;
use crate::state::ChangeEvent;
use crate::subscription::{
    RecentChangesRequest, SubscribeRequest, SubscribeResponse, SubscriptionSummary,
    UnsubscribeResponse,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tracing::info;

/// Create subscription API router
pub fn create_subscription_router(state: Arc<WatchAppState>) -> Router {
    Router::new()
        .route(
            "/api/subscriptions",
            post(subscribe).get(list_subscriptions),
        )
        .route("/api/subscriptions/:id", delete(unsubscribe))
        .route("/api/changes", post(recent_changes))
        .route("/api/entities/:id", get(get_entity))
        .with_state(state)
}

/// POST /api/subscriptions - Create a subscription
async fn subscribe(
    State(state): State<Arc<WatchAppState>>,
    Json(req): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<SubscribeResponse>), WatchError> {
    let subscription_id =
        state
            .engine
            .subscribe(&req.entity_ids, req.filter, req.callback_id, req.ttl_seconds)?;

    Ok((StatusCode::CREATED, Json(SubscribeResponse { subscription_id })))
}

/// GET /api/subscriptions - List active subscriptions
async fn list_subscriptions(
    State(state): State<Arc<WatchAppState>>,
) -> Json<Vec<SubscriptionSummary>> {
    Json(state.engine.list_subscriptions())
}

/// DELETE /api/subscriptions/:id - Remove a subscription
async fn unsubscribe(
    State(state): State<Arc<WatchAppState>>,
    Path(id): Path<String>,
) -> Json<UnsubscribeResponse> {
    let removed = state.engine.unsubscribe(&id);
    info!(subscription_id = %id, removed = removed, "Unsubscribe requested");
    Json(UnsubscribeResponse { removed })
}

/// POST /api/changes - Pull recent changes
///
/// Body fields (all optional):
/// - `subscriptionId`: changes since this subscription's last query
/// - `entityIds`: narrow the result to these entities
/// - `includeUnchanged`: also report current snapshots of quiet entities
async fn recent_changes(
    State(state): State<Arc<WatchAppState>>,
    Json(req): Json<RecentChangesRequest>,
) -> Result<Json<Vec<ChangeEvent>>, WatchError> {
    let changes = state.engine.recent_changes(
        req.subscription_id.as_deref(),
        req.entity_ids.as_deref(),
        req.include_unchanged,
    )?;
    Ok(Json(changes))
}

/// GET /api/entities/:id - Current cached snapshot
async fn get_entity(
    State(state): State<Arc<WatchAppState>>,
    Path(id): Path<String>,
) -> Result<Json<crate::state::EntitySnapshot>, WatchError> {
    state
        .engine
        .entity(&id)
        .map(|snapshot| Json((*snapshot).clone()))
        .ok_or(WatchError::NotFound(id))
}
