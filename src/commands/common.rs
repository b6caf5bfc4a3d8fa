use anyhow::Result;
use tracing::warn;

use crate::cli::RunArgs;
use crate::config::{load_config, LoadedConfig};
use crate::RunConfig;

/// Hostname used for the runtime's node name and TLS SANs
pub fn local_hostname() -> String {
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!("could not read hostname ({}), using 'localhost'", e);
            "localhost".to_string()
        }
    }
}

/// Resolve CLI arguments and the config file into a run's inputs
pub fn prepare(args: &RunArgs) -> Result<(RunConfig, LoadedConfig)> {
    let loaded = load_config(args.config.as_deref())?;
    let run = args.to_run_config(local_hostname());
    Ok((run, loaded))
}
