//! peershared: the central registry server.

pub mod server;

pub use server::RegistryServer;
