//! Error taxonomy shared by the registry, the peer listener and the download
//! client.
//!
//! - Validation / NotFound: recoverable, reported as an `ERROR` response or a
//!   console message, nothing is mutated.
//! - Transport / ProtocolViolation: fail the one connection or transfer pair
//!   they occurred on. Servers log them and keep accepting.

use crate::file_list::FileListError;
use crate::identity::IdentityError;
use crate::wire::WireError;

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl PeerError {
    /// Whether the connection this error occurred on is still usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PeerError::Validation(_) | PeerError::NotFound(_))
    }
}

impl From<IdentityError> for PeerError {
    fn from(e: IdentityError) -> Self {
        PeerError::Validation(e.to_string())
    }
}

impl From<FileListError> for PeerError {
    fn from(e: FileListError) -> Self {
        PeerError::Validation(e.to_string())
    }
}

impl From<WireError> for PeerError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Io(io) => PeerError::Transport(io),
            other => PeerError::ProtocolViolation(other.to_string()),
        }
    }
}
