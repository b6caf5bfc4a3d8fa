use anyhow::{bail, Result};
use nix::unistd::Uid;

use crate::host::SystemHost;
use crate::setup::preflight::check_preflight;

pub async fn cmd_preflight() -> Result<()> {
    if !check_preflight(&SystemHost, Uid::effective().is_root()).await {
        bail!("preflight checks failed");
    }
    Ok(())
}
