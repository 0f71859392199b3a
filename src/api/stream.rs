use crate::state::ChangeEvent;
use crate::subscription::protocol::{ChangeNotification, LaggedMessage};
use axum::extract::ws::{Message, WebSocket};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Streams one callback's deliveries to a single WebSocket client
pub struct CallbackStream {
    callback_id: String,
}

impl CallbackStream {
    pub fn new(callback_id: impl Into<String>) -> Self {
        Self {
            callback_id: callback_id.into(),
        }
    }

    /// Handle WebSocket connection lifecycle
    pub async fn handle(self, mut socket: WebSocket, mut rx: broadcast::Receiver<ChangeEvent>) {
        info!(callback_id = %self.callback_id, "Callback stream connected");

        loop {
            tokio::select! {
                // Client messages: only control frames matter
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => {
                            info!(callback_id = %self.callback_id, "Callback stream client disconnected");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = socket.send(Message::Pong(data)).await {
                                error!(error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Some(Ok(_)) => {
                            // Ignore text, binary, pong messages
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                // Deliveries for this callback
                result = rx.recv() => {
                    match result {
                        Ok(change) => {
                            let msg = ChangeNotification::new(&self.callback_id, change);
                            if let Err(e) = send_json(&mut socket, &msg).await {
                                error!(error = %e, "Failed to send change notification");
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(callback_id = %self.callback_id, skipped = skipped, "Callback stream lagged");
                            if let Err(e) = send_json(&mut socket, &LaggedMessage::new(skipped)).await {
                                error!(error = %e, "Failed to send lag notice");
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!(callback_id = %self.callback_id, "Callback unregistered, closing stream");
                            let _ = socket.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
            }
        }

        info!(callback_id = %self.callback_id, "Callback stream closed");
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, msg: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string(msg)?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}
