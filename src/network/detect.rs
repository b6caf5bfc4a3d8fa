use serde::Serialize;
use std::net::Ipv4Addr;
use tracing::{info, warn};

use super::route;
use crate::config::NetworkConfig;
use crate::host::Host;
use crate::NetworkMode;

/// Result of network mode detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub mode: NetworkMode,
    /// Address the node advertises; `None` when no route could be resolved
    pub node_ip: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
}

/// Classify from the candidate node address and default gateway.
///
/// NAT when the address sits in the hypervisor NAT subnet or the gateway is
/// the hypervisor NAT gateway. Anything else, including nothing resolved at
/// all, is bridged.
pub fn classify(
    net: &NetworkConfig,
    node_ip: Option<Ipv4Addr>,
    gateway: Option<Ipv4Addr>,
) -> NetworkMode {
    let ip_in_nat_subnet = node_ip.is_some_and(|ip| net.nat_subnet.contains(ip));
    let nat_gateway = gateway == Some(net.nat_gateway);

    if ip_in_nat_subnet || nat_gateway {
        NetworkMode::Nat
    } else {
        NetworkMode::Bridged
    }
}

/// Determine the network mode and node address.
///
/// A forced mode wins without classification, but the node address is still
/// resolved since the runtime config and kubeconfig need it.
pub async fn detect(
    host: &dyn Host,
    net: &NetworkConfig,
    mode_override: Option<NetworkMode>,
    explicit_ip: Option<Ipv4Addr>,
) -> Detection {
    let node_ip = match explicit_ip {
        Some(ip) => Some(ip),
        None => route::route_source(host, net.probe_address).await,
    };
    let gateway = route::default_gateway(host).await;

    if node_ip.is_none() {
        warn!(
            probe = %net.probe_address,
            "could not determine node IP; pass it as the first argument"
        );
    }

    let mode = match mode_override {
        Some(mode) => {
            info!(mode = %mode, "network mode forced");
            mode
        }
        None => {
            let mode = classify(net, node_ip, gateway);
            info!(
                mode = %mode,
                node_ip = ?node_ip,
                gateway = ?gateway,
                "detected network mode"
            );
            mode
        }
    };

    Detection {
        mode,
        node_ip,
        gateway,
    }
}
