pub mod common;
pub mod completions;
pub mod detect;
pub mod init_config;
pub mod preflight;
pub mod provision;
pub mod status;

// Re-export command functions
pub use completions::cmd_completions;
pub use detect::cmd_detect;
pub use init_config::cmd_init_config;
pub use preflight::cmd_preflight;
pub use provision::cmd_provision;
pub use status::cmd_status;
