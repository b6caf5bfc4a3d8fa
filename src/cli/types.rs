use super::args::{ModeOpt, RunArgs};
use crate::{NetworkMode, RunConfig};

impl From<ModeOpt> for NetworkMode {
    fn from(m: ModeOpt) -> Self {
        match m {
            ModeOpt::Nat => NetworkMode::Nat,
            ModeOpt::Bridged => NetworkMode::Bridged,
        }
    }
}

impl RunArgs {
    /// Freeze the arguments into the run's inputs
    pub fn to_run_config(&self, hostname: impl Into<String>) -> RunConfig {
        RunConfig {
            node_ip: self.node_ip,
            mode_override: self.mode.map(NetworkMode::from),
            nat_port: self.nat_port,
            version: self.version_pin.clone().filter(|v| !v.trim().is_empty()),
            hostname: hostname.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_mode_opt_conversion() {
        assert_eq!(NetworkMode::from(ModeOpt::Nat), NetworkMode::Nat);
        assert_eq!(NetworkMode::from(ModeOpt::Bridged), NetworkMode::Bridged);
    }

    #[test]
    fn test_run_config_from_args() {
        let args = RunArgs {
            node_ip: Some(Ipv4Addr::new(192, 168, 1, 50)),
            mode: Some(ModeOpt::Bridged),
            nat_port: 16443,
            version_pin: Some(String::new()),
            config: None,
        };
        let run = args.to_run_config("node-1");
        assert_eq!(run.node_ip, Some(Ipv4Addr::new(192, 168, 1, 50)));
        assert_eq!(run.mode_override, Some(NetworkMode::Bridged));
        assert_eq!(run.nat_port, 16443);
        assert_eq!(run.version, None);
        assert_eq!(run.hostname, "node-1");
    }
}
