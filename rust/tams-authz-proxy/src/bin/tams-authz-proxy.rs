use anyhow::{Context, Result};
use clap::Parser;
use tams_authz_credentials::KeySet;
use tams_authz_proxy::{AppState, ProxyConfig, router};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ProxyConfig::parse();

    let mut keys = KeySet::fetch(&config.jwks_url)
        .await
        .with_context(|| format!("Failed to load signing keys from {}", config.jwks_url))?;
    if let Some(audience) = &config.token_audience {
        keys = keys.with_audience(audience);
    }

    let state = AppState::from_config(&config, keys).context("Failed to configure the upstream")?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        api_url = %config.api_url,
        "TAMS authorization proxy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shut down");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
