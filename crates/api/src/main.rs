use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cache;
mod config;
mod documents;
mod error;
mod metrics;
mod pipeline;
mod routes;
mod state;

use config::AppConfig;
use state::AppState;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load()?;
    let address = format!("{}:{}", config.server.host, config.server.port);
    tokio::fs::create_dir_all(&config.server.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload dir {}", config.server.upload_dir))?;

    let state = Arc::new(AppState::build(config).await?);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    tracing::info!("Server listening on http://{address}");

    axum::serve(listener, app).await?;
    Ok(())
}
