//! peershare-services: registry state, command execution, and the
//! peer-to-peer transfer halves (listener and download client).

pub mod download;
pub mod executor;
pub mod peer_listener;
pub mod registry_client;
pub mod store;

pub use download::{download_files, DownloadRequest, TransferOutcome};
pub use executor::CommandExecutor;
pub use peer_listener::PeerListener;
pub use registry_client::RegistryClient;
pub use store::{BindError, FileStore, Registry, SessionId, SessionIdAllocator, SessionTable};
