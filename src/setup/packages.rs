//! rpm-ostree package steps.
//!
//! Package changes on an image-based host land in a new deployment that only
//! becomes active after reboot. `rpm -q` answers for the booted deployment, so
//! a change that was staged by an earlier run still looks missing there. The
//! pending deployment from `rpm-ostree status --json` is consulted to tell
//! "needs staging" apart from "staged, waiting for reboot".

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use super::{render_lines, ProvisionContext, Step, StepState};
use crate::host::{file_matches, run_checked, succeeds, Host, HostCommand};
use crate::paths;

#[derive(Debug, Default, Deserialize)]
struct OstreeStatus {
    #[serde(default)]
    deployments: Vec<Deployment>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct Deployment {
    #[serde(default)]
    booted: bool,
    #[serde(default, rename = "requested-packages")]
    requested_packages: Vec<String>,
    #[serde(default, rename = "requested-base-removals")]
    requested_base_removals: Vec<String>,
}

/// Booted and pending deployments. `pending` is the next-boot deployment when
/// it differs from the booted one.
#[derive(Debug, Default)]
struct Deployments {
    booted: Deployment,
    pending: Option<Deployment>,
}

async fn deployments(host: &dyn Host) -> Deployments {
    let cmd = HostCommand::query("rpm-ostree", ["status", "--json"]);
    let output = match host.run(&cmd).await {
        Ok(output) if output.success => output,
        Ok(output) => {
            debug!(stderr = %output.stderr.trim(), "rpm-ostree status failed");
            return Deployments::default();
        }
        Err(e) => {
            debug!(error = %e, "rpm-ostree status failed");
            return Deployments::default();
        }
    };

    let status: OstreeStatus = match serde_json::from_str(&output.stdout) {
        Ok(status) => status,
        Err(e) => {
            debug!(error = %e, "unparseable rpm-ostree status");
            return Deployments::default();
        }
    };

    let booted = status
        .deployments
        .iter()
        .find(|d| d.booted)
        .cloned()
        .unwrap_or_default();
    let pending = status.deployments.first().filter(|d| !d.booted).cloned();
    Deployments { booted, pending }
}

/// Whether `pkg` is installed in the booted deployment
async fn is_installed(host: &dyn Host, pkg: &str) -> bool {
    succeeds(host, &HostCommand::query("rpm", ["-q", pkg])).await
}

/// Packages from `wanted` that `rpm -q` does not report
async fn missing(host: &dyn Host, wanted: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for pkg in wanted {
        if !is_installed(host, pkg).await {
            out.push(pkg.clone());
        }
    }
    out
}

/// Packages from `unwanted` that `rpm -q` still reports
async fn present(host: &dyn Host, unwanted: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for pkg in unwanted {
        if is_installed(host, pkg).await {
            out.push(pkg.clone());
        }
    }
    out
}

async fn check_installed(host: &dyn Host, wanted: &[String]) -> Result<StepState> {
    let missing = missing(host, wanted).await;
    if missing.is_empty() {
        return Ok(StepState::Satisfied);
    }

    let staged = deployments(host).await.pending.is_some_and(|pending| {
        missing
            .iter()
            .all(|pkg| pending.requested_packages.contains(pkg))
    });
    if staged {
        return Ok(StepState::AwaitingReboot);
    }

    debug!(?missing, "packages not installed");
    Ok(StepState::Pending)
}

async fn install(host: &dyn Host, wanted: &[String]) -> Result<()> {
    let missing = missing(host, wanted).await;
    if missing.is_empty() {
        return Ok(());
    }

    info!(packages = ?missing, "layering packages");
    let mut args = vec![
        "install".to_string(),
        "--idempotent".to_string(),
        "--allow-inactive".to_string(),
    ];
    args.extend(missing);
    run_checked(host, &HostCommand::mutation("rpm-ostree", args))
        .await
        .context("installing packages")?;
    Ok(())
}

fn repo_file(ctx: &ProvisionContext) -> String {
    let pkgs = &ctx.config.packages;
    render_lines(
        "Managed by k3s-provision",
        [
            "[rancher-k3s-common-stable]".to_string(),
            "name=Rancher K3s Common (stable)".to_string(),
            format!("baseurl={}", pkgs.selinux_repo_baseurl),
            "enabled=1".to_string(),
            "gpgcheck=1".to_string(),
            "repo_gpgcheck=0".to_string(),
            format!("gpgkey={}", pkgs.selinux_repo_gpgkey),
        ],
    )
}

/// Package repository carrying the runtime's SELinux policy
pub struct SelinuxRepo;

#[async_trait::async_trait]
impl Step for SelinuxRepo {
    fn name(&self) -> &'static str {
        "selinux-repo"
    }

    async fn check(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<StepState> {
        if ctx.config.packages.selinux.is_empty()
            || file_matches(host, &paths::selinux_repo(), &repo_file(ctx)).await?
        {
            return Ok(StepState::Satisfied);
        }
        Ok(StepState::Pending)
    }

    async fn apply(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<()> {
        host.write_file(&paths::selinux_repo(), &repo_file(ctx), 0o644)
            .await
    }
}

/// SELinux policy for the runtime
pub struct SelinuxPolicy;

#[async_trait::async_trait]
impl Step for SelinuxPolicy {
    fn name(&self) -> &'static str {
        "selinux-policy"
    }

    fn requires_reboot(&self) -> bool {
        true
    }

    async fn check(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<StepState> {
        check_installed(host, &ctx.config.packages.selinux).await
    }

    async fn apply(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<()> {
        install(host, &ctx.config.packages.selinux).await
    }
}

/// Packages layered onto the OS image
pub struct RequiredPackages;

#[async_trait::async_trait]
impl Step for RequiredPackages {
    fn name(&self) -> &'static str {
        "required-packages"
    }

    fn requires_reboot(&self) -> bool {
        true
    }

    async fn check(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<StepState> {
        check_installed(host, &ctx.config.packages.required).await
    }

    async fn apply(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<()> {
        install(host, &ctx.config.packages.required).await
    }
}

/// Packages that conflict with the runtime and must go
pub struct ConflictingPackages;

#[async_trait::async_trait]
impl Step for ConflictingPackages {
    fn name(&self) -> &'static str {
        "conflicting-packages"
    }

    fn requires_reboot(&self) -> bool {
        true
    }

    async fn check(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<StepState> {
        let present = present(host, &ctx.config.packages.conflicting).await;
        if present.is_empty() {
            return Ok(StepState::Satisfied);
        }

        let deps = deployments(host).await;
        let staged = deps.pending.is_some_and(|pending| {
            present.iter().all(|pkg| {
                pending.requested_base_removals.contains(pkg)
                    || (deps.booted.requested_packages.contains(pkg)
                        && !pending.requested_packages.contains(pkg))
            })
        });
        if staged {
            return Ok(StepState::AwaitingReboot);
        }

        debug!(?present, "conflicting packages installed");
        Ok(StepState::Pending)
    }

    async fn apply(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<()> {
        let present = present(host, &ctx.config.packages.conflicting).await;
        if present.is_empty() {
            return Ok(());
        }

        // Layered packages are uninstalled; base image packages need an override
        let booted = deployments(host).await.booted;
        let (layered, base): (Vec<String>, Vec<String>) = present
            .into_iter()
            .partition(|pkg| booted.requested_packages.contains(pkg));

        if !layered.is_empty() {
            info!(packages = ?layered, "uninstalling layered packages");
            let mut args = vec!["uninstall".to_string()];
            args.extend(layered);
            run_checked(host, &HostCommand::mutation("rpm-ostree", args))
                .await
                .context("uninstalling layered packages")?;
        }

        if !base.is_empty() {
            info!(packages = ?base, "removing base packages");
            let mut args = vec!["override".to_string(), "remove".to_string()];
            args.extend(base);
            run_checked(host, &HostCommand::mutation("rpm-ostree", args))
                .await
                .context("removing base packages")?;
        }

        Ok(())
    }
}
