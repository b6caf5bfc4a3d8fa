use std::path::Path;
use tracing::{info, warn};

use crate::host::{Host, HostCommand};

/// Ask the freshly installed control plane for its nodes.
///
/// Failure is reported, not raised: right after install the API server may
/// simply not be up yet.
pub async fn check_cluster(host: &dyn Host, runtime_bin: &Path) -> bool {
    let bin = runtime_bin.to_string_lossy();
    let cmd = HostCommand::query(&bin, ["kubectl", "get", "nodes"]);

    match host.run(&cmd).await {
        Ok(output) if output.success => {
            info!("control plane reachable");
            for line in output.stdout.lines() {
                info!(target: "nodes", "{}", line);
            }
            true
        }
        Ok(output) => {
            warn!(
                stderr = %output.stderr.trim(),
                "control plane not reachable yet; it may still be starting"
            );
            false
        }
        Err(e) => {
            warn!(error = %e, "could not query control plane");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FakeHost;

    #[tokio::test]
    async fn test_check_cluster_ready() {
        let host = FakeHost::new();
        assert!(check_cluster(&host, Path::new("/usr/local/bin/k3s")).await);
        assert_eq!(host.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_check_cluster_not_ready() {
        let host = FakeHost::new().cluster_ready(false);
        assert!(!check_cluster(&host, Path::new("/usr/local/bin/k3s")).await);
    }
}
