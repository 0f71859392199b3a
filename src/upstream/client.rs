use crate::config::UpstreamConfig;
use crate::upstream::protocol::{self, ServerMessage, UpstreamEvent, GET_STATES_ID};
use anyhow::{anyhow, bail, Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Derive the WebSocket endpoint from the configured base URL
pub fn websocket_url(base: &str) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("Invalid upstream URL '{}'", base))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => bail!("Unsupported upstream URL scheme '{}'", other),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("Cannot convert '{}' to a WebSocket URL", base))?;
    url.set_path("/api/websocket");
    Ok(url)
}

/// Home Assistant WebSocket event source.
///
/// Pushes `UpstreamEvent`s into the engine's inbound channel in arrival
/// order and reconnects with exponential backoff. Every connection starts
/// with a full `get_states` resync.
pub struct HassEventSource {
    config: UpstreamConfig,
    tx: mpsc::Sender<UpstreamEvent>,
}

impl HassEventSource {
    pub fn new(config: UpstreamConfig, tx: mpsc::Sender<UpstreamEvent>) -> Self {
        Self { config, tx }
    }

    /// Run until cancelled or until the engine stops receiving
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let url = websocket_url(&self.config.url)?;
        let initial = Duration::from_secs(self.config.initial_backoff_seconds.max(1));
        let max = Duration::from_secs(self.config.max_backoff_seconds.max(1)).max(initial);
        let mut backoff = initial;

        info!(url = %url, "Starting upstream event source");

        loop {
            let mut established = false;
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.session(&url, &mut established, &cancel) => r,
            };

            if let Err(e) = outcome {
                warn!(error = %e, "Upstream connection failed");
            }
            if cancel.is_cancelled() {
                break;
            }
            if self.tx.send(UpstreamEvent::Disconnected).await.is_err() {
                info!("Engine stopped receiving, upstream source exiting");
                break;
            }

            if established {
                backoff = initial;
            }
            info!(delay_secs = backoff.as_secs(), "Reconnecting to upstream");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(max);
        }

        info!("Upstream event source stopped");
        Ok(())
    }

    /// One connection: authenticate, resync, then stream state changes
    async fn session(
        &self,
        url: &Url,
        established: &mut bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (mut ws, _) = connect_async(url.as_str())
            .await
            .context("Failed to connect to upstream WebSocket")?;

        authenticate(&mut ws, &self.config.token).await?;
        *established = true;
        info!("Upstream connection authenticated");

        self.forward(UpstreamEvent::Connected).await?;
        send_json(&mut ws, protocol::get_states_message()).await?;
        send_json(&mut ws, protocol::subscribe_message()).await?;

        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = ws.close(None).await;
                    return Ok(());
                }
                msg = ws.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => self.handle_text(&text).await?,
                Some(Ok(Message::Ping(data))) => {
                    ws.send(Message::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Upstream closed the connection");
                    return Ok(());
                }
                Some(Ok(_)) => {
                    // Ignore binary, pong, frame messages
                }
                Some(Err(e)) => return Err(e).context("Upstream WebSocket error"),
            }
        }
    }

    async fn handle_text(&self, text: &str) -> Result<()> {
        let msg: ServerMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Unparseable upstream message, skipping");
                return Ok(());
            }
        };

        match msg {
            ServerMessage::Result {
                id, success: true, result, ..
            } if id == GET_STATES_ID => {
                let snapshots = protocol::parse_states(result)?;
                info!(entities = snapshots.len(), "Received full state resync");
                self.forward(UpstreamEvent::Resync(snapshots)).await
            }
            ServerMessage::Result {
                id, success: false, error, ..
            } => {
                error!(id = id, error = ?error, "Upstream command failed");
                bail!("Upstream rejected command {}", id)
            }
            ServerMessage::Event { event, .. } => match protocol::parse_event(event) {
                Ok(Some(update)) => self.forward(update).await,
                Ok(None) => Ok(()),
                Err(e) => {
                    warn!(error = %e, "Malformed state_changed event, skipping");
                    Ok(())
                }
            },
            other => {
                debug!(message = ?other, "Ignoring upstream message");
                Ok(())
            }
        }
    }

    async fn forward(&self, event: UpstreamEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow!("Engine inbound channel closed"))
    }
}

async fn send_json(ws: &mut WsStream, payload: Value) -> Result<()> {
    ws.send(Message::Text(payload.to_string().into()))
        .await
        .context("Failed to send upstream command")
}

/// Perform the token handshake
async fn authenticate(ws: &mut WsStream, token: &str) -> Result<()> {
    while let Some(msg) = ws.next().await {
        let msg = msg.context("WebSocket error during auth")?;
        let Message::Text(text) = msg else {
            continue;
        };

        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(ServerMessage::AuthRequired { ha_version }) => {
                debug!(ha_version = ?ha_version, "Upstream requested auth");
                send_json(ws, protocol::auth_message(token)).await?;
            }
            Ok(ServerMessage::AuthOk { ha_version }) => {
                info!(ha_version = ?ha_version, "Upstream auth accepted");
                return Ok(());
            }
            Ok(ServerMessage::AuthInvalid { message }) => {
                bail!(
                    "Upstream authentication failed: {}",
                    message.unwrap_or_else(|| "invalid token".to_string())
                );
            }
            Ok(_) | Err(_) => continue,
        }
    }

    bail!("No auth response received")
}
