use crate::host::{succeeds, Host, HostCommand};

/// Commands every step relies on, with what they are needed for
const REQUIRED_COMMANDS: &[(&str, &str)] = &[
    ("rpm-ostree", "package layering"),
    ("rpm", "package queries"),
    ("ip", "network detection"),
    ("curl", "runtime installer download"),
    ("modprobe", "kernel modules"),
    ("sysctl", "kernel parameters"),
    ("systemctl", "service restarts"),
    ("sh", "runtime installer"),
];

/// Check host requirements and print a checklist. Returns whether all passed.
pub async fn check_preflight(host: &dyn Host, is_root: bool) -> bool {
    println!("🔍 Checking k3s-provision requirements...\n");

    let mut all_ok = true;

    for (cmd, purpose) in REQUIRED_COMMANDS {
        all_ok &= check_command(host, cmd, purpose).await;
    }

    print!("  root privileges ... ");
    if is_root {
        println!("✓ running as root");
    } else {
        println!("✗ run with sudo");
        all_ok = false;
    }

    println!();
    if all_ok {
        println!("✅ All checks passed! Run: sudo k3s-provision [NODE_IP]");
    } else {
        println!("⚠️  Some checks failed. This tool targets rpm-ostree hosts (Fedora CoreOS, IoT, Atomic desktops).");
    }

    all_ok
}

async fn check_command(host: &dyn Host, cmd: &str, purpose: &str) -> bool {
    print!("  {} ({}) ... ", cmd, purpose);

    let probe = format!("command -v {}", cmd);
    if succeeds(host, &HostCommand::query("sh", ["-c", probe.as_str()])).await {
        println!("✓ found");
        true
    } else {
        println!("✗ not found");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FakeHost;

    #[tokio::test]
    async fn test_preflight_passes() {
        let host = FakeHost::new();
        assert!(check_preflight(&host, true).await);
        assert_eq!(host.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_preflight_missing_command() {
        let host = FakeHost::new().without_command("rpm-ostree");
        assert!(!check_preflight(&host, true).await);
    }

    #[tokio::test]
    async fn test_preflight_requires_root() {
        let host = FakeHost::new();
        assert!(!check_preflight(&host, false).await);
    }
}
