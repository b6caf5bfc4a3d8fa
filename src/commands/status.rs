use anyhow::Result;
use serde::Serialize;

use super::common::prepare;
use crate::cli::StatusArgs;
use crate::host::SystemHost;
use crate::network::Detection;
use crate::provisioner::Provisioner;
use crate::setup::StepState;

#[derive(Debug, Serialize)]
struct StatusReport {
    detection: Detection,
    steps: Vec<StepStatus>,
}

#[derive(Debug, Serialize)]
struct StepStatus {
    name: &'static str,
    state: StepState,
}

/// Show which steps would act on the next run
pub async fn cmd_status(args: StatusArgs) -> Result<()> {
    let (run, loaded) = prepare(&args.run)?;
    let (detection, states) = Provisioner::default()
        .plan(&SystemHost, run, loaded.config)
        .await?;

    let report = StatusReport {
        detection,
        steps: states
            .into_iter()
            .map(|(name, state)| StepStatus { name, state })
            .collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let node_ip = report
        .detection
        .node_ip
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("network: {}  node-ip: {}", report.detection.mode, node_ip);
    println!();
    println!("{:<22} STATE", "STEP");
    for step in &report.steps {
        let state = match step.state {
            StepState::Satisfied => "✓ satisfied",
            StepState::Pending => "• pending",
            StepState::AwaitingReboot => "↻ awaiting reboot",
        };
        println!("{:<22} {}", step.name, state);
    }

    Ok(())
}
