use anyhow::{Context, Result};
use faceverify_core::{OnnxVerifier, ARCFACE_MODEL_NAME};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod error;
mod http;
mod ingest;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        bind_addr = %config.bind_addr,
        model_dir = %config.model_dir.display(),
        model = ARCFACE_MODEL_NAME,
        metric = %config.metric,
        temp_dir = %config.temp_dir.display(),
        "faceverifyd starting"
    );

    // Load models synchronously so a missing model fails startup
    let verifier = OnnxVerifier::load(&config.model_dir, config.metric, config.threshold)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    let engine = engine::spawn_engine(Box::new(verifier), config.queue_depth)?;

    let router = http::build_router(
        http::AppState {
            engine,
            temp_dir: config.temp_dir.clone(),
        },
        config.max_body_bytes,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "{} ready", http::SERVICE_NAME);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("faceverifyd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("received shutdown signal");
    }
}
