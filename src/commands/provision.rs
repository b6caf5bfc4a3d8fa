use anyhow::Result;
use tracing::{info, warn};

use super::common::prepare;
use crate::cli::RunArgs;
use crate::host::SystemHost;
use crate::provisioner::{ProvisionReport, Provisioner};

/// Run the full provisioning sequence against this machine.
///
/// A reboot-required halt is not an error: the caller reboots and runs the
/// same command again.
pub async fn cmd_provision(args: RunArgs) -> Result<ProvisionReport> {
    let (run, loaded) = prepare(&args)?;
    info!(
        hostname = %run.hostname,
        version = run.version.as_deref().unwrap_or("latest"),
        config_sha = %loaded.sha_short,
        "k3s-provision starting"
    );

    let report = Provisioner::default()
        .run(&SystemHost, run, loaded.config)
        .await?;

    match (report.reboot_required(), report.cluster_reachable) {
        (true, _) => {
            println!("Reboot required. After rebooting, run k3s-provision again to continue.");
        }
        (false, Some(true)) => {
            println!("✓ k3s is provisioned and the cluster is reachable");
        }
        (false, _) => {
            warn!("k3s is provisioned but the cluster did not answer yet");
        }
    }

    Ok(report)
}
