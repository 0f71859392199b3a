use crate::error::WatchError;
use crate::state::ChangeEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Delivery target for push notifications.
#[async_trait]
pub trait CallbackSink: Send + Sync {
    async fn deliver(&self, event: &ChangeEvent) -> anyhow::Result<()>;
}

/// Sink that fans deliveries out to broadcast receivers (e.g. WebSocket clients)
pub struct ChannelSink {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl CallbackSink for ChannelSink {
    async fn deliver(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        self.tx
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| anyhow::anyhow!("no listeners attached"))
    }
}

/// Per-callback queue feeding a single worker task
struct CallbackHandle {
    tx: mpsc::Sender<ChangeEvent>,
}

/// Delivers admitted events to registered callback sinks.
///
/// Each callback gets its own bounded queue and worker, so a slow sink only
/// delays its own deliveries. Events queued for one callback are delivered in
/// the order they were queued.
pub struct CallbackDispatcher {
    callbacks: DashMap<String, CallbackHandle>,
    queue_capacity: usize,
    delivery_timeout: Duration,
}

impl CallbackDispatcher {
    pub fn new(queue_capacity: usize, delivery_timeout: Duration) -> Self {
        Self {
            callbacks: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
            delivery_timeout,
        }
    }

    /// Register (or replace) a callback sink.
    ///
    /// Spawns the delivery worker, so it must be called inside a tokio runtime.
    /// Returns true if an existing registration was replaced.
    pub fn register(&self, callback_id: &str, sink: Arc<dyn CallbackSink>) -> bool {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        tokio::spawn(run_worker(
            callback_id.to_string(),
            sink,
            rx,
            self.delivery_timeout,
        ));

        let replaced = self
            .callbacks
            .insert(callback_id.to_string(), CallbackHandle { tx })
            .is_some();

        info!(callback_id = %callback_id, replaced = replaced, "Callback registered");
        replaced
    }

    /// Remove a callback; already queued events are still drained by its worker
    pub fn unregister(&self, callback_id: &str) -> bool {
        let removed = self.callbacks.remove(callback_id).is_some();
        if removed {
            info!(callback_id = %callback_id, "Callback unregistered");
        }
        removed
    }

    pub fn is_registered(&self, callback_id: &str) -> bool {
        self.callbacks.contains_key(callback_id)
    }

    /// Queue `event` for `callback_id` without waiting on the sink
    pub fn deliver(&self, callback_id: &str, event: ChangeEvent) -> Result<(), WatchError> {
        let handle = self
            .callbacks
            .get(callback_id)
            .ok_or_else(|| WatchError::DeliveryFailed {
                callback_id: callback_id.to_string(),
                reason: "callback not registered".to_string(),
            })?;

        handle.tx.try_send(event).map_err(|e| {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "delivery queue full",
                mpsc::error::TrySendError::Closed(_) => "delivery worker stopped",
            };
            WatchError::DeliveryFailed {
                callback_id: callback_id.to_string(),
                reason: reason.to_string(),
            }
        })
    }
}

async fn run_worker(
    callback_id: String,
    sink: Arc<dyn CallbackSink>,
    mut rx: mpsc::Receiver<ChangeEvent>,
    delivery_timeout: Duration,
) {
    while let Some(event) = rx.recv().await {
        match tokio::time::timeout(delivery_timeout, sink.deliver(&event)).await {
            Ok(Ok(())) => {
                debug!(callback_id = %callback_id, entity_id = %event.entity_id, "Delivered change");
            }
            Ok(Err(e)) => {
                let err = WatchError::DeliveryFailed {
                    callback_id: callback_id.clone(),
                    reason: e.to_string(),
                };
                warn!(error = %err, entity_id = %event.entity_id, "Callback delivery failed");
            }
            Err(_) => {
                let err = WatchError::DeliveryFailed {
                    callback_id: callback_id.clone(),
                    reason: format!("timed out after {:?}", delivery_timeout),
                };
                warn!(error = %err, entity_id = %event.entity_id, "Callback delivery failed");
            }
        }
    }

    debug!(callback_id = %callback_id, "Callback worker stopped");
}
