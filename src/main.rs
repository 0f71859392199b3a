use anyhow::{Context, Result};
use entity_watch::api::{create_router, WatchAppState};
use entity_watch::clock::{SharedClock, SystemClock};
use entity_watch::config;
use entity_watch::engine::WatchEngine;
use entity_watch::upstream::HassEventSource;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "entity_watch=info".into()),
        )
        .init();

    info!("entity-watch starting...");

    let config = config::load_from_env()?;
    info!(config = ?config, "Configuration loaded");

    let clock: SharedClock = Arc::new(SystemClock);
    let engine = Arc::new(WatchEngine::new(config.engine.clone(), clock));
    let cancel = CancellationToken::new();

    // Inbound stream: upstream source -> engine, one message at a time
    let (tx, rx) = mpsc::channel(1024);
    let engine_task = tokio::spawn(Arc::clone(&engine).run(rx, cancel.clone()));

    let source = HassEventSource::new(config.upstream.clone(), tx);
    let source_cancel = cancel.clone();
    let source_task = tokio::spawn(async move {
        if let Err(e) = source.run(source_cancel).await {
            error!(error = %e, "Upstream event source failed");
        }
    });

    let sweeper_task = tokio::spawn(engine.sweeper().run(cancel.clone()));

    let state = Arc::new(WatchAppState::new(
        Arc::clone(&engine),
        config.api.stream_capacity,
    ));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.api.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.api.bind_address))?;
    info!(address = %config.api.bind_address, "Tool API listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await
        .context("HTTP server failed")?;

    cancel.cancel();
    let _ = tokio::join!(engine_task, source_task, sweeper_task);

    info!("entity-watch stopped");
    Ok(())
}
