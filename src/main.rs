use elportal_auth::datahub::{DataHubClient, DataHubConfig};
use elportal_auth::kv::{MemoryKv, RestKv};
use elportal_auth::server::{AuthConfig, auth_routes};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("elportal_auth=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AuthConfig::from_env()?;
    // Keep serving: session endpoints answer with a configuration error.
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "SESSION_SECRET is unusable");
    }

    let provider = DataHubClient::new(DataHubConfig::from_env()?);

    let app = if config.dev_mode() {
        tracing::warn!("DEV_AUTH enabled: insecure cookies, in-memory store");
        auth_routes(config, MemoryKv::new(), provider)
    } else {
        auth_routes(config, RestKv::from_env()?, provider)
    };

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "elportal-auth listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
