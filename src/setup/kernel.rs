use anyhow::{Context, Result};
use tracing::info;

use super::{render_lines, ProvisionContext, Step, StepState};
use crate::host::{file_matches, run_checked, Host, HostCommand};
use crate::paths;

fn modules_file(ctx: &ProvisionContext) -> String {
    render_lines("Managed by k3s-provision", &ctx.config.kernel.modules)
}

fn sysctl_file(ctx: &ProvisionContext) -> String {
    render_lines(
        "Managed by k3s-provision",
        ctx.config
            .kernel
            .sysctl
            .iter()
            .map(|(key, value)| format!("{} = {}", key, value)),
    )
}

/// Modules not present under /sys/module
async fn unloaded_modules(host: &dyn Host, ctx: &ProvisionContext) -> Vec<String> {
    let mut out = Vec::new();
    for module in &ctx.config.kernel.modules {
        if !host.exists(&paths::loaded_module(module)).await {
            out.push(module.clone());
        }
    }
    out
}

/// Kernel modules the runtime's networking and storage need, loaded now and at boot
pub struct KernelModules;

#[async_trait::async_trait]
impl Step for KernelModules {
    fn name(&self) -> &'static str {
        "kernel-modules"
    }

    async fn check(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<StepState> {
        if ctx.config.kernel.modules.is_empty() {
            return Ok(StepState::Satisfied);
        }
        let persisted = file_matches(host, &paths::modules_load_conf(), &modules_file(ctx)).await?;
        if persisted && unloaded_modules(host, ctx).await.is_empty() {
            return Ok(StepState::Satisfied);
        }
        Ok(StepState::Pending)
    }

    async fn apply(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<()> {
        let path = paths::modules_load_conf();
        let content = modules_file(ctx);
        if !file_matches(host, &path, &content).await? {
            host.write_file(&path, &content, 0o644).await?;
        }

        for module in unloaded_modules(host, ctx).await {
            info!(module = %module, "loading kernel module");
            run_checked(host, &HostCommand::mutation("modprobe", [module.as_str()]))
                .await
                .with_context(|| format!("loading kernel module {}", module))?;
        }
        Ok(())
    }
}

/// Kernel parameters for bridged traffic filtering and forwarding
pub struct Sysctl;

#[async_trait::async_trait]
impl Step for Sysctl {
    fn name(&self) -> &'static str {
        "sysctl"
    }

    async fn check(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<StepState> {
        if ctx.config.kernel.sysctl.is_empty()
            || file_matches(host, &paths::sysctl_conf(), &sysctl_file(ctx)).await?
        {
            return Ok(StepState::Satisfied);
        }
        Ok(StepState::Pending)
    }

    async fn apply(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<()> {
        host.write_file(&paths::sysctl_conf(), &sysctl_file(ctx), 0o644)
            .await?;
        run_checked(host, &HostCommand::mutation("sysctl", ["--system"]))
            .await
            .context("applying sysctl settings")?;
        Ok(())
    }
}
