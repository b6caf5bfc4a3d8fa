// Common test utilities for k3s-provision integration tests
#![allow(dead_code)]

use std::net::Ipv4Addr;

use k3s_provision::config::ProvisionConfig;
use k3s_provision::host::FakeHost;
use k3s_provision::provisioner::{ProvisionReport, Provisioner};
use k3s_provision::setup::RunOutcome;
use k3s_provision::RunConfig;

/// Client kubeconfig location used by tests
pub const CLIENT_KUBECONFIG: &str = "/home/core/.kube/config";

/// Default config with the kubeconfig sent to a fixed path and no waiting
pub fn test_config() -> ProvisionConfig {
    let mut config = ProvisionConfig::default();
    config.kubeconfig.output = CLIENT_KUBECONFIG.to_string();
    config.kubeconfig.wait_secs = 0;
    config
}

pub fn run_config() -> RunConfig {
    RunConfig::new("node-1")
}

pub fn bridged_run(ip: [u8; 4]) -> RunConfig {
    let mut run = run_config();
    run.node_ip = Some(Ipv4Addr::from(ip));
    run
}

/// Host behind hypervisor NAT
pub fn nat_host() -> FakeHost {
    FakeHost::new().with_route(Some("10.0.2.15"), Some("10.0.2.2"))
}

/// Host on a LAN
pub fn bridged_host() -> FakeHost {
    FakeHost::new().with_route(Some("192.168.1.50"), Some("192.168.1.1"))
}

pub async fn provision(host: &FakeHost, run: RunConfig) -> ProvisionReport {
    Provisioner::default()
        .run(host, run, test_config())
        .await
        .expect("provisioning run failed")
}

/// Run and reboot until the sequence completes. Returns the reboot steps hit.
pub async fn provision_to_completion(host: &FakeHost, run: RunConfig) -> Vec<&'static str> {
    let mut reboots = Vec::new();
    for _ in 0..10 {
        let report = provision(host, run.clone()).await;
        match report.run.outcome {
            RunOutcome::Completed => return reboots,
            RunOutcome::RebootRequired { step } => {
                reboots.push(step);
                host.reboot();
            }
        }
    }
    panic!("provisioning did not converge: {:?}", reboots);
}
