pub mod cli;
pub mod commands;
pub mod config;
pub mod health;
pub mod host;
pub mod network;
pub mod paths;
pub mod provisioner;
pub mod setup;
pub mod types;

/// Port the k3s API server listens on inside the node
pub const DEFAULT_API_PORT: u16 = 6443;

// Re-export core types for convenience
pub use types::{NetworkMode, RunConfig};
