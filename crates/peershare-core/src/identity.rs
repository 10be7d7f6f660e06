//! Peer identity: the `name-host:port` triple every table is keyed on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Expected textual shape, quoted back to the user on parse failure.
pub const IDENTITY_FORMAT: &str = "<username>-<host>:<port>";

/// Immutable identity of a peer.
///
/// Equality and hashing cover all three fields. The canonical text form
/// (`Display`) is `name-host:port` and parses back with `FromStr`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserIdentity {
    name: String,
    host: String,
    port: u16,
}

impl UserIdentity {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Result<Self, IdentityError> {
        let name = name.into();
        let host = host.into();
        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }
        if host.is_empty() {
            return Err(IdentityError::EmptyHost);
        }
        Ok(Self { name, host, port })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, suitable for `TcpStream::connect` / `TcpListener::bind`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}:{}", self.name, self.host, self.port)
    }
}

impl FromStr for UserIdentity {
    type Err = IdentityError;

    /// Split once on the first `-`, then the remainder once on `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, addr) = s.trim().split_once('-').ok_or(IdentityError::Malformed)?;
        let (host, port) = addr.trim().split_once(':').ok_or(IdentityError::Malformed)?;
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| IdentityError::InvalidPort(port.trim().to_string()))?;
        UserIdentity::new(name.trim(), host.trim(), port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("user data format is invalid, expected {}", IDENTITY_FORMAT)]
    Malformed,

    #[error("port {0:?} is not a valid 16-bit unsigned integer")]
    InvalidPort(String),

    #[error("user name must not be empty")]
    EmptyName,

    #[error("host must not be empty")]
    EmptyHost,
}
