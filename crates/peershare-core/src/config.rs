//! Configuration system for peershare.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PEERSHARE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/peershare/config.toml
//!   3. ~/.config/peershare/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default registry server port.
pub const DEFAULT_SERVER_PORT: u16 = 7777;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeershareConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub transfer: TransferConfig,
}

/// Registry server (`peershared`) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the registry binds to.
    pub host: String,
    pub port: u16,
    /// Longest accepted command line. Longer lines close the connection.
    pub max_line_bytes: usize,
}

/// Peer client (`peershare-ctl`) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_host: String,
    pub server_port: u16,
    /// How often the cached user list is refreshed. 0 = never.
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Buffer size for reading files served by the peer listener.
    pub copy_buffer_bytes: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_SERVER_PORT,
            max_line_bytes: 64 * 1024,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: "localhost".to_string(),
            server_port: DEFAULT_SERVER_PORT,
            refresh_interval_secs: 30,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            copy_buffer_bytes: 64 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ClientConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("peershare")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PeershareConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load a specific file, falling back to defaults if it does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(PeershareConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PEERSHARE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&PeershareConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply PEERSHARE_* overrides. `lookup` is `std::env::var` in production.
    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PEERSHARE_SERVER__HOST") {
            self.server.host = v;
        }
        if let Some(p) = lookup("PEERSHARE_SERVER__PORT").and_then(|v| v.parse().ok()) {
            self.server.port = p;
        }
        if let Some(v) = lookup("PEERSHARE_CLIENT__SERVER_HOST") {
            self.client.server_host = v;
        }
        if let Some(p) = lookup("PEERSHARE_CLIENT__SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.client.server_port = p;
        }
        if let Some(s) =
            lookup("PEERSHARE_CLIENT__REFRESH_INTERVAL_SECS").and_then(|v| v.parse().ok())
        {
            self.client.refresh_interval_secs = s;
        }
    }
}
