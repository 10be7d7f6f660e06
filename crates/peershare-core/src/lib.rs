//! peershare-core: shared types, wire format, and configuration.
//! All other peershare crates depend on this one.

pub mod command;
pub mod config;
pub mod error;
pub mod file_list;
pub mod identity;
pub mod wire;

pub use command::Command;
pub use error::PeerError;
pub use identity::UserIdentity;
pub use wire::{Response, ResponseStatus};
