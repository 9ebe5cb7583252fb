use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use device_data_api::auth::Authenticator;
use device_data_api::config::config;
use device_data_api::database::PostgresStore;
use device_data_api::services::{IdentityClient, MetadataClient, RestrictedTokenClient, SharingClient};
use device_data_api::state::AppState;

#[derive(Parser)]
#[command(name = "device-data-api")]
#[command(about = "Read-only streaming API for historical device data")]
#[command(version)]
struct Args {
    /// Port to listen on, overriding PORT and the environment profile
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so local runs pick up DATABASE_URL and the service URLs
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = config();
    tracing::info!("Starting device data API in {:?} mode", config.environment);

    let identity = Arc::new(IdentityClient::new(&config.clients).context("identity client")?);
    let restricted = Arc::new(RestrictedTokenClient::new(&config.clients, identity.clone()).context("auth client")?);
    let sharing = Arc::new(SharingClient::new(&config.clients, identity.clone()).context("sharing client")?);
    let metadata = Arc::new(MetadataClient::new(&config.clients, identity.clone()).context("metadata client")?);

    let store = PostgresStore::connect(&config.database)
        .await
        .context("failed to connect to device data store")?;
    store.ensure_indexes().await;

    let state = AppState::new(Authenticator::new(identity, restricted), sharing, metadata, Arc::new(store));
    let app = device_data_api::app_with_config(state, &config.api);

    let port = args.port.unwrap_or(config.service.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Device data API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Device data API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
