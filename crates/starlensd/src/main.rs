use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use starlens_core::LabelCatalog;
use starlensd::api::{create_router, AppState};
use starlensd::config::Config;
use starlensd::engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starlensd starting");

    let config = Config::load()?;
    tracing::info!(
        bind = %config.bind,
        label_map = %config.label_map.display(),
        cascade = %config.cascade_model.display(),
        classifier = %config.classifier_model.display(),
        "configuration loaded"
    );

    // Everything loads before the listener binds; any failure aborts startup.
    let catalog = Arc::new(LabelCatalog::load(&config.label_map)?);
    let engine = engine::spawn_from_config(&config, catalog.clone())?;

    let state = Arc::new(AppState { catalog, engine });
    let app = create_router(state, config.max_body_bytes);

    let listener = TcpListener::bind(&config.bind).await?;
    tracing::info!(addr = %config.bind, "starlensd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("starlensd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
