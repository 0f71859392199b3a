use crate::api::stream::CallbackStream;
use crate::api::WatchAppState;
use crate::callback::ChannelSink;
use crate::error::WatchError;
use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    response::{Json, Response},
    routing::{get, put},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCallbackResponse {
    pub callback_id: String,
    pub replaced: bool,
}

#[derive(Serialize)]
pub struct UnregisterCallbackResponse {
    pub removed: bool,
}

/// Create callback API router
pub fn create_callback_router(state: Arc<WatchAppState>) -> Router {
    Router::new()
        .route(
            "/api/callbacks/:id",
            put(register_callback).delete(unregister_callback),
        )
        .route("/api/callbacks/:id/ws", get(callback_ws))
        .with_state(state)
}

/// PUT /api/callbacks/:id - Register a callback backed by a WebSocket stream
async fn register_callback(
    State(state): State<Arc<WatchAppState>>,
    Path(id): Path<String>,
) -> Result<Json<RegisterCallbackResponse>, WatchError> {
    let sink = Arc::new(ChannelSink::new(state.stream_capacity));
    let replaced = state.engine.register_callback(&id, sink.clone())?;
    state.streams.insert(id.clone(), sink);

    Ok(Json(RegisterCallbackResponse {
        callback_id: id,
        replaced,
    }))
}

/// DELETE /api/callbacks/:id - Unregister a callback
///
/// Subscriptions naming this callback stay active; their pushes are dropped.
async fn unregister_callback(
    State(state): State<Arc<WatchAppState>>,
    Path(id): Path<String>,
) -> Json<UnregisterCallbackResponse> {
    let removed = state.engine.unregister_callback(&id);
    state.streams.remove(&id);
    Json(UnregisterCallbackResponse { removed })
}

/// GET /api/callbacks/:id/ws - Stream deliveries for a registered callback
async fn callback_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WatchAppState>>,
    Path(id): Path<String>,
) -> Result<Response, WatchError> {
    let rx = state
        .streams
        .get(&id)
        .map(|sink| sink.subscribe())
        .ok_or_else(|| WatchError::NotFound(id.clone()))?;

    info!(callback_id = %id, "Callback stream upgrade request received");
    Ok(ws.on_upgrade(move |socket| CallbackStream::new(id).handle(socket, rx)))
}
