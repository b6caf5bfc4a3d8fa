//! Ordered, idempotent provisioning steps and the sequencer that runs them.
//!
//! Each step pairs a side-effect free precondition check with an action. The
//! sequencer skips steps whose precondition already holds, runs the rest in
//! order, and stops the whole run after any step whose change only takes
//! effect after a reboot. Re-running after the reboot picks up where the
//! previous run stopped because every completed step now reports satisfied.

pub mod kernel;
pub mod kubeconfig;
pub mod packages;
pub mod preflight;
pub mod runtime;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ProvisionConfig;
use crate::host::Host;
use crate::network::Detection;
use crate::RunConfig;

/// Everything a step may look at. Built once per run, never mutated.
#[derive(Debug, Clone)]
pub struct ProvisionContext {
    pub run: RunConfig,
    pub config: ProvisionConfig,
    pub detection: Detection,
}

/// Outcome of a precondition check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepState {
    /// Nothing to do
    Satisfied,
    /// The action needs to run
    Pending,
    /// The change is already staged and only a reboot will apply it
    AwaitingReboot,
}

#[async_trait::async_trait]
pub trait Step: Send + Sync {
    /// Stable name used in logs and status output
    fn name(&self) -> &'static str;

    /// Whether the action only takes effect after a reboot
    fn requires_reboot(&self) -> bool {
        false
    }

    /// Inspect the host without changing it
    async fn check(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<StepState>;

    /// Bring the host into the state `check` looks for
    async fn apply(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<()>;
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    RebootRequired { step: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub applied: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
    pub outcome: RunOutcome,
}

/// Fixed, ordered list of steps
pub struct Sequencer {
    steps: Vec<Box<dyn Step>>,
}

impl Sequencer {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    /// The full provisioning sequence in execution order
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(packages::SelinuxRepo),
            Box::new(packages::SelinuxPolicy),
            Box::new(packages::RequiredPackages),
            Box::new(packages::ConflictingPackages),
            Box::new(kernel::KernelModules),
            Box::new(kernel::Sysctl),
            Box::new(runtime::RuntimeConfigFile),
            Box::new(runtime::RuntimeInstall),
            Box::new(kubeconfig::ClientKubeconfig),
        ])
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order.
    ///
    /// Returns early with [`RunOutcome::RebootRequired`] after a reboot-bound
    /// action, or when a step reports its change is staged for the next boot.
    /// An action error aborts the run.
    pub async fn run(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<RunReport> {
        let mut applied = Vec::new();
        let mut skipped = Vec::new();

        for step in &self.steps {
            let name = step.name();
            let state = step
                .check(host, ctx)
                .await
                .with_context(|| format!("checking step '{}'", name))?;

            match state {
                StepState::Satisfied => {
                    info!(step = name, "already satisfied, skipping");
                    skipped.push(name);
                }
                StepState::AwaitingReboot => {
                    warn!(step = name, "change is staged, waiting for reboot");
                    return Ok(RunReport {
                        applied,
                        skipped,
                        outcome: RunOutcome::RebootRequired { step: name },
                    });
                }
                StepState::Pending => {
                    info!(step = name, "applying");
                    step.apply(host, ctx)
                        .await
                        .with_context(|| format!("step '{}' failed", name))?;
                    applied.push(name);

                    if step.requires_reboot() {
                        return Ok(RunReport {
                            applied,
                            skipped,
                            outcome: RunOutcome::RebootRequired { step: name },
                        });
                    }
                }
            }
        }

        Ok(RunReport {
            applied,
            skipped,
            outcome: RunOutcome::Completed,
        })
    }

    /// Evaluate every precondition without acting.
    ///
    /// Later steps may report `Pending` only because an earlier one has not
    /// run yet.
    pub async fn plan(
        &self,
        host: &dyn Host,
        ctx: &ProvisionContext,
    ) -> Result<Vec<(&'static str, StepState)>> {
        let mut states = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let state = step
                .check(host, ctx)
                .await
                .with_context(|| format!("checking step '{}'", step.name()))?;
            states.push((step.name(), state));
        }
        Ok(states)
    }
}

/// Render `lines` as a newline-terminated file body under a header comment
pub(crate) fn render_lines<I, S>(header: &str, lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = format!("# {}\n", header);
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_sequence_order() {
        assert_eq!(
            Sequencer::standard().step_names(),
            vec![
                "selinux-repo",
                "selinux-policy",
                "required-packages",
                "conflicting-packages",
                "kernel-modules",
                "sysctl",
                "runtime-config",
                "runtime-install",
                "kubeconfig",
            ]
        );
    }

    #[test]
    fn test_render_lines() {
        assert_eq!(
            render_lines("managed", ["a", "b"]),
            "# managed\na\nb\n"
        );
    }
}
