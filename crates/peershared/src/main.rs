//! peershared: peershare registry daemon.

use anyhow::{Context, Result};

use peershare_core::config::PeershareConfig;
use peershare_services::Registry;
use peershared::RegistryServer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = PeershareConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = PeershareConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PeershareConfig::default()
    });

    // `peershared [port]`
    if let Some(port) = std::env::args().nth(1) {
        config.server.port = port
            .parse()
            .with_context(|| format!("invalid port {port:?}"))?;
    }

    let server = RegistryServer::bind(&config.server, Registry::new()).await?;
    tracing::info!(addr = %server.local_addr()?, "peershared starting");

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    server.run(shutdown_tx.subscribe()).await?;
    tracing::info!("peershared stopped");
    Ok(())
}
