//! `api-gatewayd`: runs the resilience gateway with its admin HTTP surface.
//!
//! Usage: `api-gatewayd [CONFIG_PATH]`. Without an argument the default
//! search locations are used.

use gateway_config::{load_config, ConfigLoader, GatewayConfig, ENV_PREFIX};
use gateway_orchestrator::Gateway;
use gateway_providers::{build_clients, StaticFallback};
use gateway_server::{server::shutdown_signal, AppState, Server, ServerConfig};
use gateway_telemetry::{init_logging, Metrics};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            ConfigLoader::new()
                .with_file(path)
                .with_env_prefix(ENV_PREFIX)
                .load()
                .await?
        }
        None => load_config().await?,
    };

    init_logging(&config.logging)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting api-gatewayd");

    let gateway = Arc::new(build_gateway(config.clone())?);
    let shutdown = CancellationToken::new();
    let purger = tokio::spawn(purge_cache(Arc::clone(&gateway), shutdown.clone()));

    if config.admin.enabled {
        let server = Server::new(ServerConfig::from(&config.admin), AppState::new(gateway));
        server.run().await?;
    } else {
        info!("Admin server disabled, waiting for shutdown signal");
        shutdown_signal().await;
    }

    shutdown.cancel();
    purger.await?;
    info!("api-gatewayd stopped");
    Ok(())
}

fn build_gateway(config: GatewayConfig) -> Result<Gateway, Box<dyn Error>> {
    let clients = build_clients(&config)?;
    info!(clients = clients.len(), "Configured live API clients");

    let metrics = if config.metrics.enabled {
        Some(Arc::new(Metrics::new(&config.metrics)?))
    } else {
        None
    };

    let mut builder = Gateway::builder(config).fallback(StaticFallback::new());
    for client in clients {
        builder = builder.shared_client(client);
    }
    if let Some(metrics) = metrics {
        builder = builder.metrics(metrics);
    }

    Ok(builder.build()?)
}

async fn purge_cache(gateway: Arc<Gateway>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let purged = gateway.purge_expired_cache();
                if purged > 0 {
                    debug!(purged, "Purged expired cache entries");
                }
            }
        }
    }
}
