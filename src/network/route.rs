//! Routing table lookups via iproute2.

use std::net::Ipv4Addr;
use tracing::debug;

use crate::host::{Host, HostCommand};

/// Value following `keyword` in whitespace-separated `ip route` output
fn field_after(stdout: &str, keyword: &str) -> Option<Ipv4Addr> {
    stdout
        .split_whitespace()
        .skip_while(|w| *w != keyword)
        .nth(1)
        .and_then(|w| w.parse().ok())
}

/// Parse the source address from `ip route get <addr>`.
///
/// Output format: "1.1.1.1 via 192.168.1.1 dev eth0 src 192.168.1.50 uid 0"
pub fn parse_route_source(stdout: &str) -> Option<Ipv4Addr> {
    field_after(stdout, "src")
}

/// Parse the gateway from `ip route show default`.
///
/// Output format: "default via 192.168.1.1 dev eth0 proto dhcp metric 100".
/// Only the first default route is considered.
pub fn parse_default_gateway(stdout: &str) -> Option<Ipv4Addr> {
    stdout
        .lines()
        .find(|line| line.trim_start().starts_with("default"))
        .and_then(|line| field_after(line, "via"))
}

/// Address the host would use as source when talking to `probe`
pub async fn route_source(host: &dyn Host, probe: Ipv4Addr) -> Option<Ipv4Addr> {
    let probe = probe.to_string();
    let cmd = HostCommand::query("ip", ["-4", "route", "get", probe.as_str()]);
    match host.run(&cmd).await {
        Ok(output) if output.success => parse_route_source(&output.stdout),
        Ok(output) => {
            debug!(stderr = %output.stderr.trim(), "route lookup failed");
            None
        }
        Err(e) => {
            debug!(error = %e, "route lookup failed");
            None
        }
    }
}

/// Gateway of the first default route
pub async fn default_gateway(host: &dyn Host) -> Option<Ipv4Addr> {
    let cmd = HostCommand::query("ip", ["-4", "route", "show", "default"]);
    match host.run(&cmd).await {
        Ok(output) if output.success => parse_default_gateway(&output.stdout),
        Ok(output) => {
            debug!(stderr = %output.stderr.trim(), "default route lookup failed");
            None
        }
        Err(e) => {
            debug!(error = %e, "default route lookup failed");
            None
        }
    }
}
