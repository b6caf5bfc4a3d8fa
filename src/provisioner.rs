use anyhow::Result;
use tracing::{info, warn};

use crate::config::ProvisionConfig;
use crate::health;
use crate::host::Host;
use crate::network::{self, Detection};
use crate::setup::{ProvisionContext, RunOutcome, RunReport, Sequencer, StepState};
use crate::RunConfig;

/// Result of a full provisioning run
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub detection: Detection,
    pub run: RunReport,
    /// `None` when the run stopped before the final check
    pub cluster_reachable: Option<bool>,
}

impl ProvisionReport {
    pub fn reboot_required(&self) -> bool {
        matches!(self.run.outcome, RunOutcome::RebootRequired { .. })
    }
}

/// Detection, step sequencing and the final reachability check
pub struct Provisioner {
    sequencer: Sequencer,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self::new(Sequencer::standard())
    }
}

impl Provisioner {
    pub fn new(sequencer: Sequencer) -> Self {
        Self { sequencer }
    }

    /// Detect the network and assemble the per-run context
    pub async fn context(
        host: &dyn Host,
        run: RunConfig,
        config: ProvisionConfig,
    ) -> ProvisionContext {
        let detection =
            network::detect(host, &config.network, run.mode_override, run.node_ip).await;
        ProvisionContext {
            run,
            config,
            detection,
        }
    }

    pub async fn run(
        &self,
        host: &dyn Host,
        run: RunConfig,
        config: ProvisionConfig,
    ) -> Result<ProvisionReport> {
        let ctx = Self::context(host, run, config).await;
        let report = self.sequencer.run(host, &ctx).await?;

        let cluster_reachable = match &report.outcome {
            RunOutcome::Completed => {
                info!(
                    applied = report.applied.len(),
                    skipped = report.skipped.len(),
                    "all steps complete"
                );
                Some(health::check_cluster(host, &ctx.config.runtime.bin_path).await)
            }
            RunOutcome::RebootRequired { step } => {
                warn!(step = *step, "reboot required; run again after rebooting");
                None
            }
        };

        Ok(ProvisionReport {
            detection: ctx.detection,
            run: report,
            cluster_reachable,
        })
    }

    /// Evaluate every step without acting
    pub async fn plan(
        &self,
        host: &dyn Host,
        run: RunConfig,
        config: ProvisionConfig,
    ) -> Result<(Detection, Vec<(&'static str, StepState)>)> {
        let ctx = Self::context(host, run, config).await;
        let states = self.sequencer.plan(host, &ctx).await?;
        Ok((ctx.detection, states))
    }
}
