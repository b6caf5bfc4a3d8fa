use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use super::{ProvisionContext, Step, StepState};
use crate::host::{file_matches, run_checked, Host, HostCommand};
use crate::paths;

/// Subject alternative names for the API server certificate, deduplicated in
/// order: hostname, node IP, loopback, then configured extras.
pub fn tls_sans(ctx: &ProvisionContext) -> Vec<String> {
    let mut sans: Vec<String> = Vec::new();
    let candidates = std::iter::once(ctx.run.hostname.clone())
        .chain(ctx.detection.node_ip.map(|ip| ip.to_string()))
        .chain(std::iter::once("127.0.0.1".to_string()))
        .chain(ctx.config.runtime.tls_san.iter().cloned());

    for san in candidates {
        if !san.is_empty() && !sans.contains(&san) {
            sans.push(san);
        }
    }
    sans
}

/// Render /etc/rancher/k3s/config.yaml
pub fn render_runtime_config(ctx: &ProvisionContext) -> String {
    let mut out = String::from("# Managed by k3s-provision\n");
    if let Some(ip) = ctx.detection.node_ip {
        out.push_str(&format!("node-ip: \"{}\"\n", ip));
    }
    out.push_str(&format!(
        "write-kubeconfig-mode: \"{}\"\n",
        ctx.config.runtime.write_kubeconfig_mode
    ));
    out.push_str("tls-san:\n");
    for san in tls_sans(ctx) {
        out.push_str(&format!("  - \"{}\"\n", san));
    }
    out
}

/// Runtime configuration read by the service on start
pub struct RuntimeConfigFile;

#[async_trait::async_trait]
impl Step for RuntimeConfigFile {
    fn name(&self) -> &'static str {
        "runtime-config"
    }

    async fn check(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<StepState> {
        if file_matches(host, &paths::runtime_config(), &render_runtime_config(ctx)).await? {
            return Ok(StepState::Satisfied);
        }
        Ok(StepState::Pending)
    }

    async fn apply(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<()> {
        host.write_file(&paths::runtime_config(), &render_runtime_config(ctx), 0o600)
            .await?;

        // A running service only reads its config on start
        if host.exists(&ctx.config.runtime.bin_path).await {
            info!("runtime already installed, restarting to pick up new config");
            run_checked(
                host,
                &HostCommand::mutation("systemctl", ["try-restart", "k3s"]),
            )
            .await
            .context("restarting runtime service")?;
        }
        Ok(())
    }
}

/// Fetch the installer script to disk; `curl -f` exits non-zero on HTTP errors
pub fn installer_download_command(ctx: &ProvisionContext) -> HostCommand {
    let script = paths::installer_script();
    let script = script.to_string_lossy();
    HostCommand::mutation(
        "curl",
        [
            "-sfL",
            "-o",
            &*script,
            ctx.config.runtime.installer_url.as_str(),
        ],
    )
}

/// Run the downloaded installer script
pub fn installer_command(ctx: &ProvisionContext) -> HostCommand {
    let runtime = &ctx.config.runtime;
    let script = paths::installer_script();

    let mut cmd = HostCommand::mutation("sh", [script.to_string_lossy()])
        .env("INSTALL_K3S_SKIP_SELINUX_RPM", "true");
    if let Some(bin_dir) = runtime.bin_path.parent().and_then(Path::to_str) {
        cmd = cmd.env("INSTALL_K3S_BIN_DIR", bin_dir);
    }
    if let Some(version) = &ctx.run.version {
        cmd = cmd.env("INSTALL_K3S_VERSION", version);
    }
    cmd
}

/// The runtime itself, installed through its upstream installer
pub struct RuntimeInstall;

#[async_trait::async_trait]
impl Step for RuntimeInstall {
    fn name(&self) -> &'static str {
        "runtime-install"
    }

    async fn check(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<StepState> {
        let bin = &ctx.config.runtime.bin_path;
        if !host.exists(bin).await {
            return Ok(StepState::Pending);
        }

        let Some(version) = &ctx.run.version else {
            return Ok(StepState::Satisfied);
        };

        let bin_str = bin.to_string_lossy();
        let output = host
            .run(&HostCommand::query(&bin_str, ["--version"]))
            .await?;
        let installed = output.stdout.lines().next().unwrap_or("").trim();
        debug!(installed = %installed, pinned = %version, "comparing runtime version");

        if output.success && installed.split_whitespace().any(|w| w == version.as_str()) {
            Ok(StepState::Satisfied)
        } else {
            Ok(StepState::Pending)
        }
    }

    async fn apply(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<()> {
        info!(
            url = %ctx.config.runtime.installer_url,
            version = ctx.run.version.as_deref().unwrap_or("stable"),
            "running runtime installer"
        );
        async {
            run_checked(host, &installer_download_command(ctx))
                .await
                .context("downloading installer script")?;
            run_checked(host, &installer_command(ctx)).await?;
            Ok::<_, anyhow::Error>(())
        }
        .await
        .context("running runtime installer")
    }
}
