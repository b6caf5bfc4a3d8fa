pub mod detect;
pub mod route;

pub use detect::{classify, detect, Detection};

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// An IPv4 network in CIDR notation (e.g. `10.0.2.0/24`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Subnet {
    addr: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Subnet {
    /// Prefix lengths above 32 are clamped to 32
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Self {
        Self {
            addr,
            prefix: prefix.min(32),
        }
    }

    fn mask(&self) -> u32 {
        match self.prefix {
            0 => 0,
            p => u32::MAX << (32 - u32::from(p)),
        }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask = self.mask();
        u32::from(ip) & mask == u32::from(self.addr) & mask
    }
}

impl std::fmt::Display for Ipv4Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl std::str::FromStr for Ipv4Subnet {
    type Err = anyhow::Error;

    /// Parse `ADDR/PREFIX`. A bare address is a /32.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (addr_str, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => {
                let prefix: u8 = prefix
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid prefix length: {}", prefix))?;
                if prefix > 32 {
                    anyhow::bail!("prefix length out of range: {}", prefix);
                }
                (addr, prefix)
            }
            None => (s, 32),
        };
        let addr = addr_str
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid IPv4 address: {}", addr_str))?;
        Ok(Self::new(addr, prefix))
    }
}

impl TryFrom<String> for Ipv4Subnet {
    type Error = anyhow::Error;

    fn try_from(s: String) -> anyhow::Result<Self> {
        s.parse()
    }
}

impl From<Ipv4Subnet> for String {
    fn from(subnet: Ipv4Subnet) -> Self {
        subnet.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subnet() {
        let net: Ipv4Subnet = "10.0.2.0/24".parse().unwrap();
        assert!(net.contains(Ipv4Addr::new(10, 0, 2, 15)));
        assert!(net.contains(Ipv4Addr::new(10, 0, 2, 255)));
        assert!(!net.contains(Ipv4Addr::new(10, 0, 3, 15)));
        assert_eq!(net.to_string(), "10.0.2.0/24");

        let host: Ipv4Subnet = "192.168.1.50".parse().unwrap();
        assert!(host.contains(Ipv4Addr::new(192, 168, 1, 50)));
        assert!(!host.contains(Ipv4Addr::new(192, 168, 1, 51)));

        let any: Ipv4Subnet = "0.0.0.0/0".parse().unwrap();
        assert!(any.contains(Ipv4Addr::new(8, 8, 8, 8)));

        assert!("10.0.2.0/33".parse::<Ipv4Subnet>().is_err());
        assert!("10.0.2/24".parse::<Ipv4Subnet>().is_err());
        assert!("10.0.2.0/x".parse::<Ipv4Subnet>().is_err());
    }
}
