//! UTM Server - live drone monitoring against restricted airspace

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use utm_server::config::{Config, LogFormat};
use utm_server::state::AppState;
use utm_server::{api, loops, persistence};

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("utm_server=debug".parse()?);
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    init_tracing(config.log_format)?;

    tracing::info!("Starting UTM Server...");

    let db = persistence::init_database(&config.database_path, config.database_max_connections)
        .await?;
    let port = config.server_port;
    let state = Arc::new(AppState::new(db, config));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let staleness = tokio::spawn(loops::staleness_loop::run_staleness_loop(
        state.clone(),
        shutdown_tx.subscribe(),
    ));
    let live = tokio::spawn(loops::live_update_loop::run_live_update_loop(
        state.clone(),
        shutdown_tx.subscribe(),
    ));

    let app = api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, stopping background loops");
    let _ = shutdown_tx.send(());
    let _ = tokio::join!(staleness, live);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
