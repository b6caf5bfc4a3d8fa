use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// How the node is reachable from the machine that will run kubectl
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Behind hypervisor NAT; clients go through loopback + a forwarded port
    Nat,
    /// Directly routable on the client's network
    Bridged,
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkMode::Nat => write!(f, "nat"),
            NetworkMode::Bridged => write!(f, "bridged"),
        }
    }
}

impl std::str::FromStr for NetworkMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nat" => Ok(NetworkMode::Nat),
            "bridged" | "bridge" => Ok(NetworkMode::Bridged),
            other => anyhow::bail!("invalid network mode: {} (expected nat or bridged)", other),
        }
    }
}

/// Inputs for a single provisioning run. Built once at startup.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub node_ip: Option<Ipv4Addr>,
    pub mode_override: Option<NetworkMode>,
    pub nat_port: u16,
    pub version: Option<String>,
    pub hostname: String,
}

impl RunConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            node_ip: None,
            mode_override: None,
            nat_port: crate::DEFAULT_API_PORT,
            version: None,
            hostname: hostname.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_mode_serialization() {
        let json = serde_json::to_string(&NetworkMode::Nat).unwrap();
        assert_eq!(json, "\"nat\"");

        let deserialized: NetworkMode = serde_json::from_str("\"bridged\"").unwrap();
        assert_eq!(deserialized, NetworkMode::Bridged);
    }

    #[test]
    fn test_network_mode_from_str() {
        assert_eq!("NAT".parse::<NetworkMode>().unwrap(), NetworkMode::Nat);
        assert_eq!(" bridged ".parse::<NetworkMode>().unwrap(), NetworkMode::Bridged);
        assert!("host".parse::<NetworkMode>().is_err());
    }

    #[test]
    fn test_run_config_defaults() {
        let run = RunConfig::new("node-1");
        assert_eq!(run.nat_port, 6443);
        assert!(run.node_ip.is_none());
        assert!(run.mode_override.is_none());
    }
}
