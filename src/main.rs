use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mongoconnect::{Config, Session, api};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let session = Session::connect(&config.session)
        .await
        .context("Failed to connect to MongoDB")?;

    let state = api::AppState::new(session.clone(), config.watch_buffer);
    let shutdown = state.shutdown.clone();
    let app = api::router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    session.close().await?;
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("shutting down");
    shutdown.cancel();
}
