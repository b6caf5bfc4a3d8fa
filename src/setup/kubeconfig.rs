//! Client kubeconfig derived from the one the runtime writes for itself.
//!
//! The runtime's kubeconfig points at `https://127.0.0.1:6443`, which is only
//! right from inside the node. The copy produced here points at whatever the
//! client outside the node should use: the forwarded loopback port under NAT,
//! or the node's own address when bridged.

use anyhow::{Context, Result};
use std::net::Ipv4Addr;
use std::path::Path;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

use super::{ProvisionContext, Step, StepState};
use crate::config::{invoking_user, user_home};
use crate::host::{run_checked, Host, HostCommand};
use crate::{paths, NetworkMode, DEFAULT_API_PORT};

const SERVER_PREFIX: &str = "server: https://";

/// `HOST:PORT` the client should use, or `None` when it cannot be known
pub fn server_endpoint(
    mode: NetworkMode,
    nat_port: u16,
    node_ip: Option<Ipv4Addr>,
) -> Option<String> {
    match mode {
        NetworkMode::Nat => Some(format!("127.0.0.1:{}", nat_port)),
        NetworkMode::Bridged => node_ip.map(|ip| format!("{}:{}", ip, DEFAULT_API_PORT)),
    }
}

/// `HOST:PORT` with a non-empty host and a numeric port
fn is_host_port(s: &str) -> bool {
    match s.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty()
                && !host.contains(char::is_whitespace)
                && !port.is_empty()
                && port.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Replace the address on every `server: https://HOST:PORT` line.
///
/// Indentation and line endings are kept. Content without a matching line is
/// returned unchanged.
pub fn rewrite_server(content: &str, endpoint: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        let ending = &line[body.len()..];
        let trimmed = body.trim_start();
        let indent = &body[..body.len() - trimmed.len()];

        match trimmed.strip_prefix(SERVER_PREFIX) {
            Some(rest) if is_host_port(rest.trim_end()) => {
                out.push_str(indent);
                out.push_str(SERVER_PREFIX);
                out.push_str(endpoint);
                out.push_str(ending);
            }
            _ => out.push_str(line),
        }
    }
    out
}

/// The client kubeconfig that should exist, given the runtime's kubeconfig
pub fn render_client_kubeconfig(ctx: &ProvisionContext, source: &str) -> String {
    let endpoint = server_endpoint(
        ctx.detection.mode,
        ctx.run.nat_port,
        ctx.detection.node_ip,
    );
    match endpoint {
        Some(endpoint) => rewrite_server(source, &endpoint),
        None => source.to_string(),
    }
}

/// `chown` handing the client kubeconfig to `user`.
///
/// Only paths inside `home` are handed over: the file itself, plus its parent
/// directory when that is below `home` too (`~/.kube`). `None` for anything
/// else, so a kubeconfig written next to root-owned files keeps root ownership.
pub fn ownership_command(user: &str, home: &Path, output: &Path) -> Option<HostCommand> {
    if home.parent().is_none() || !output.starts_with(home) || output == home {
        return None;
    }

    let mut args = vec![format!("{}:", user)];
    if let Some(parent) = output.parent().filter(|p| *p != home) {
        args.push(parent.to_string_lossy().into_owned());
    }
    args.push(output.to_string_lossy().into_owned());
    Some(HostCommand::mutation("chown", args))
}

/// Poll until `path` exists, for at most `timeout_secs`
async fn wait_for_file(host: &dyn Host, path: &Path, timeout_secs: u64) -> Result<String> {
    let waited = timeout(Duration::from_secs(timeout_secs), async {
        loop {
            if let Some(content) = host.read_file(path).await? {
                return Ok::<_, anyhow::Error>(content);
            }
            debug!(path = %path.display(), "waiting for runtime kubeconfig");
            sleep(Duration::from_millis(500)).await;
        }
    })
    .await;

    match waited {
        Ok(result) => result,
        Err(_) => anyhow::bail!(
            "timed out after {}s waiting for {}",
            timeout_secs,
            path.display()
        ),
    }
}

/// Client kubeconfig with the server address rewritten for the network mode
pub struct ClientKubeconfig;

#[async_trait::async_trait]
impl Step for ClientKubeconfig {
    fn name(&self) -> &'static str {
        "kubeconfig"
    }

    async fn check(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<StepState> {
        let Some(source) = host.read_file(&paths::runtime_kubeconfig()).await? else {
            return Ok(StepState::Pending);
        };
        let output = ctx.config.kubeconfig.output_path();
        let desired = render_client_kubeconfig(ctx, &source);
        if host.read_file(&output).await?.as_deref() == Some(desired.as_str()) {
            return Ok(StepState::Satisfied);
        }
        Ok(StepState::Pending)
    }

    async fn apply(&self, host: &dyn Host, ctx: &ProvisionContext) -> Result<()> {
        let source_path = paths::runtime_kubeconfig();
        let source = wait_for_file(host, &source_path, ctx.config.kubeconfig.wait_secs).await?;

        if ctx.detection.mode == NetworkMode::Bridged && ctx.detection.node_ip.is_none() {
            warn!("no node IP known, client kubeconfig keeps the runtime's server address");
        }

        let output = ctx.config.kubeconfig.output_path();
        let desired = render_client_kubeconfig(ctx, &source);
        host.write_file(&output, &desired, 0o600).await?;
        info!(path = %output.display(), mode = %ctx.detection.mode, "wrote client kubeconfig");

        if let Some(user) = invoking_user() {
            let chown = user_home(&user)
                .and_then(|home| ownership_command(&user, &home, &output));
            match chown {
                Some(cmd) => {
                    run_checked(host, &cmd)
                        .await
                        .with_context(|| format!("handing {} to {}", output.display(), user))?;
                }
                None => debug!(
                    path = %output.display(),
                    user = %user,
                    "kubeconfig is outside the user's home, ownership left to root"
                ),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;
    use crate::host::fake::FAKE_RUNTIME_KUBECONFIG;
    use crate::host::FakeHost;
    use crate::network::Detection;
    use crate::RunConfig;

    fn ctx(mode: NetworkMode, node_ip: Option<Ipv4Addr>, output: &str) -> ProvisionContext {
        let mut config = ProvisionConfig::default();
        config.kubeconfig.output = output.to_string();
        config.kubeconfig.wait_secs = 0;
        ProvisionContext {
            run: RunConfig::new("node-1"),
            config,
            detection: Detection {
                mode,
                node_ip,
                gateway: None,
            },
        }
    }

    #[test]
    fn test_rewrite_nat() {
        let endpoint = server_endpoint(NetworkMode::Nat, 6443, None).unwrap();
        assert_eq!(
            rewrite_server("server: https://203.0.113.5:6443", &endpoint),
            "server: https://127.0.0.1:6443"
        );
    }

    #[test]
    fn test_rewrite_bridged() {
        let endpoint =
            server_endpoint(NetworkMode::Bridged, 16443, Some(Ipv4Addr::new(192, 168, 1, 50)))
                .unwrap();
        assert_eq!(
            rewrite_server("server: https://203.0.113.5:6443", &endpoint),
            "server: https://192.168.1.50:6443"
        );
    }

    #[test]
    fn test_rewrite_nat_uses_forwarded_port() {
        let endpoint = server_endpoint(NetworkMode::Nat, 16443, None).unwrap();
        let out = rewrite_server(FAKE_RUNTIME_KUBECONFIG, &endpoint);
        assert!(out.contains("\n    server: https://127.0.0.1:16443\n"));
        assert_eq!(out.lines().count(), FAKE_RUNTIME_KUBECONFIG.lines().count());
    }

    #[test]
    fn test_rewrite_without_match_is_noop() {
        let content = "apiVersion: v1\nkind: Config\nserver: http://10.0.0.1:8080\n";
        assert_eq!(rewrite_server(content, "127.0.0.1:6443"), content);
    }

    #[test]
    fn test_rewrite_ignores_malformed_server() {
        let content = "    server: https://no-port-here\n";
        assert_eq!(rewrite_server(content, "127.0.0.1:6443"), content);
    }

    #[test]
    fn test_rewrite_keeps_crlf() {
        let content = "  server: https://127.0.0.1:6443\r\nkind: Config\r\n";
        assert_eq!(
            rewrite_server(content, "192.168.1.50:6443"),
            "  server: https://192.168.1.50:6443\r\nkind: Config\r\n"
        );
    }

    #[test]
    fn test_bridged_without_ip_has_no_endpoint() {
        assert_eq!(server_endpoint(NetworkMode::Bridged, 6443, None), None);
    }

    #[test]
    fn test_ownership_inside_home() {
        let cmd = ownership_command(
            "alice",
            Path::new("/home/alice"),
            Path::new("/home/alice/.kube/config"),
        )
        .unwrap();
        assert_eq!(cmd.to_string(), "chown alice: /home/alice/.kube /home/alice/.kube/config");
        assert!(cmd.is_mutation());
    }

    #[test]
    fn test_ownership_does_not_touch_home_itself() {
        let cmd = ownership_command(
            "alice",
            Path::new("/home/alice"),
            Path::new("/home/alice/kubeconfig"),
        )
        .unwrap();
        assert_eq!(cmd.to_string(), "chown alice: /home/alice/kubeconfig");
    }

    #[test]
    fn test_no_ownership_change_outside_home() {
        let home = Path::new("/home/alice");
        assert!(ownership_command("alice", home, Path::new("/etc/rancher/k3s/client.yaml")).is_none());
        assert!(ownership_command("alice", home, Path::new("/home/alice2/.kube/config")).is_none());
        assert!(ownership_command("alice", Path::new("/"), Path::new("/etc/kubeconfig")).is_none());
    }

    #[tokio::test]
    async fn test_client_kubeconfig_written_once() {
        let output = "/srv/kube/config";
        let host = FakeHost::new().with_file(paths::runtime_kubeconfig(), FAKE_RUNTIME_KUBECONFIG);
        let ctx = ctx(NetworkMode::Bridged, Some(Ipv4Addr::new(192, 168, 1, 50)), output);

        assert_eq!(ClientKubeconfig.check(&host, &ctx).await.unwrap(), StepState::Pending);
        ClientKubeconfig.apply(&host, &ctx).await.unwrap();

        let written = host.file(output).unwrap();
        assert!(written.contains("    server: https://192.168.1.50:6443\n"));
        assert_eq!(host.file_mode(output), Some(0o600));
        assert_eq!(ClientKubeconfig.check(&host, &ctx).await.unwrap(), StepState::Satisfied);
    }

    #[tokio::test]
    async fn test_missing_runtime_kubeconfig_times_out() {
        let host = FakeHost::new();
        let ctx = ctx(NetworkMode::Nat, None, "/srv/kube/config");

        assert_eq!(ClientKubeconfig.check(&host, &ctx).await.unwrap(), StepState::Pending);
        let err = ClientKubeconfig.apply(&host, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
