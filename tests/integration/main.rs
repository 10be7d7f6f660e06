//! peershare integration test harness.
//!
//! Every test runs a real registry server and real peer listeners on
//! loopback TCP, each on an OS-assigned port, so tests run in parallel
//! without coordination.
//!
//!   cargo test --test integration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;

use peershare_core::config::ServerConfig;
use peershare_services::{PeerListener, Registry, RegistryClient};
use peershared::RegistryServer;

mod registry;
mod transfer;

// ── Harness ───────────────────────────────────────────────────────────────────

/// A registry server running on loopback for the lifetime of the value.
pub struct TestRegistry {
    pub addr: String,
    pub registry: Registry,
    _shutdown: broadcast::Sender<()>,
}

impl TestRegistry {
    pub async fn start() -> Result<Self> {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        };
        let registry = Registry::new();
        let server = RegistryServer::bind(&config, registry.clone()).await?;
        let addr = server.local_addr()?.to_string();
        let (shutdown, rx) = broadcast::channel(1);
        tokio::spawn(server.run(rx));
        Ok(Self {
            addr,
            registry,
            _shutdown: shutdown,
        })
    }

    pub async fn client(&self) -> Result<RegistryClient> {
        RegistryClient::connect(&self.addr)
            .await
            .with_context(|| format!("failed to connect to test registry at {}", self.addr))
    }
}

/// A peer listener on loopback. Returns the port it listens on.
pub async fn start_peer() -> Result<(u16, broadcast::Sender<()>)> {
    let listener = PeerListener::bind("127.0.0.1:0", 8 * 1024).await?;
    let port = listener.local_addr()?.port();
    let (shutdown, rx) = broadcast::channel(1);
    tokio::spawn(listener.run(rx));
    Ok((port, shutdown))
}

/// Per-test scratch directory under the system temp dir.
pub fn scratch_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("peershare-it-{}-{test}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// Poll `done` every 20ms until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if done() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("condition not met within {timeout:?}")
}

#[tokio::test]
async fn test_harness_registry_accepts_clients() {
    let server = TestRegistry::start().await.unwrap();
    let client = server.client().await.unwrap();
    let resp = client.request("list-files").await.unwrap();
    assert!(resp.is_ok());
    assert_eq!(resp.message, "[]");
}
