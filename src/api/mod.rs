// HTTP and WebSocket tool surface

pub mod callbacks;
mod error;
pub mod health;
mod stream;
pub mod subscriptions;

pub use callbacks::create_callback_router;
pub use health::create_health_router;
pub use stream::CallbackStream;
pub use subscriptions::create_subscription_router;

use crate::callback::ChannelSink;
use crate::engine::WatchEngine;
use axum::Router;
use dashmap::DashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state for all tool routes
pub struct WatchAppState {
    pub engine: Arc<WatchEngine>,
    /// Callback id -> broadcast sink feeding WebSocket streams
    pub streams: DashMap<String, Arc<ChannelSink>>,
    /// Buffered notifications per callback stream
    pub stream_capacity: usize,
}

impl WatchAppState {
    pub fn new(engine: Arc<WatchEngine>, stream_capacity: usize) -> Self {
        Self {
            engine,
            streams: DashMap::new(),
            stream_capacity,
        }
    }
}

/// Full tool router
pub fn create_router(state: Arc<WatchAppState>) -> Router {
    Router::new()
        .merge(create_subscription_router(Arc::clone(&state)))
        .merge(create_callback_router(Arc::clone(&state)))
        .merge(create_health_router(state))
        .layer(CorsLayer::permissive())
}
