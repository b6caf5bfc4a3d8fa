//! In-memory host used by tests and by anything that needs to exercise the
//! step logic without touching a real machine.
//!
//! It understands the handful of commands the provisioner issues (`rpm`,
//! `rpm-ostree`, `ip`, `modprobe`, the installer download and run, `k3s`) well enough
//! that running a step's action makes its precondition hold afterwards.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{CommandOutput, Host, HostCommand};
use crate::paths;

/// Kubeconfig the simulated installer writes
pub const FAKE_RUNTIME_KUBECONFIG: &str = "apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: LS0tLS1CRUdJTi==
    server: https://127.0.0.1:6443
  name: default
contexts:
- context:
    cluster: default
    user: default
  name: default
current-context: default
kind: Config
preferences: {}
users:
- name: default
  user:
    client-certificate-data: LS0tLS1CRUdJTi==
    client-key-data: LS0tLS1CRUdJTi==
";

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<PathBuf, (String, u32)>,
    installed: BTreeSet<String>,
    layered: BTreeSet<String>,
    staged_installs: BTreeSet<String>,
    staged_uninstalls: BTreeSet<String>,
    staged_removals: BTreeSet<String>,
    route_src: Option<String>,
    default_gateway: Option<String>,
    runtime_version: Option<String>,
    failing: HashSet<String>,
    missing_commands: HashSet<String>,
    cluster_ready: bool,
    installer_writes_kubeconfig: bool,
    commands: Vec<HostCommand>,
    mutations: usize,
}

/// Simulated host. All state sits behind one mutex.
#[derive(Debug)]
pub struct FakeHost {
    state: Mutex<State>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                cluster_ready: true,
                installer_writes_kubeconfig: true,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock only happens inside a failing test
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Address reported as `src` by `ip route get` and the default gateway.
    /// `None` makes the corresponding lookup fail like a host with no route.
    pub fn with_route(self, src: Option<&str>, gateway: Option<&str>) -> Self {
        {
            let mut state = self.state();
            state.route_src = src.map(str::to_string);
            state.default_gateway = gateway.map(str::to_string);
        }
        self
    }

    /// Package present in the booted deployment
    pub fn with_package(self, name: &str) -> Self {
        self.state().installed.insert(name.to_string());
        self
    }

    /// Package layered on top of the base image in the booted deployment
    pub fn with_layered_package(self, name: &str) -> Self {
        {
            let mut state = self.state();
            state.installed.insert(name.to_string());
            state.layered.insert(name.to_string());
        }
        self
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.state()
            .files
            .insert(path.into(), (contents.to_string(), 0o644));
        self
    }

    /// Make every invocation of `program` exit non-zero
    pub fn failing(self, program: &str) -> Self {
        self.state().failing.insert(program.to_string());
        self
    }

    /// Make `command -v <name>` fail
    pub fn without_command(self, name: &str) -> Self {
        self.state().missing_commands.insert(name.to_string());
        self
    }

    pub fn cluster_ready(self, ready: bool) -> Self {
        self.state().cluster_ready = ready;
        self
    }

    /// Whether the simulated installer produces the runtime kubeconfig
    pub fn installer_writes_kubeconfig(self, writes: bool) -> Self {
        self.state().installer_writes_kubeconfig = writes;
        self
    }

    /// Simulate a reboot: staged package changes become active
    pub fn reboot(&self) {
        let mut state = self.state();
        let installs = std::mem::take(&mut state.staged_installs);
        state.installed.extend(installs.iter().cloned());
        state.layered.extend(installs);
        let uninstalls = std::mem::take(&mut state.staged_uninstalls);
        let removals = std::mem::take(&mut state.staged_removals);
        for pkg in uninstalls.iter().chain(removals.iter()) {
            state.installed.remove(pkg);
            state.layered.remove(pkg);
        }
    }

    /// Number of file writes and mutating commands performed so far
    pub fn mutation_count(&self) -> usize {
        self.state().mutations
    }

    pub fn commands(&self) -> Vec<HostCommand> {
        self.state().commands.clone()
    }

    pub fn mutating_commands(&self) -> Vec<String> {
        self.state()
            .commands
            .iter()
            .filter(|c| c.is_mutation())
            .map(ToString::to_string)
            .collect()
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state()
            .files
            .get(path.as_ref())
            .map(|(contents, _)| contents.clone())
    }

    pub fn file_mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.state().files.get(path.as_ref()).map(|(_, mode)| *mode)
    }

    pub fn is_installed(&self, pkg: &str) -> bool {
        self.state().installed.contains(pkg)
    }

    pub fn is_staged(&self, pkg: &str) -> bool {
        let state = self.state();
        state.staged_installs.contains(pkg)
            || state.staged_uninstalls.contains(pkg)
            || state.staged_removals.contains(pkg)
    }

    fn simulate(state: &mut State, cmd: &HostCommand) -> CommandOutput {
        if state.failing.contains(&cmd.program) {
            return failure(&format!("{}: simulated failure", cmd.program));
        }

        let args: Vec<&str> = cmd.args.iter().map(String::as_str).collect();
        match (cmd.program.as_str(), args.as_slice()) {
            ("rpm", ["-q", pkg]) => {
                if state.installed.contains(*pkg) {
                    success(&format!("{}-1.0-1.noarch\n", pkg))
                } else {
                    failure(&format!("package {} is not installed", pkg))
                }
            }
            ("rpm-ostree", ["status", "--json"]) => success(&status_json(state)),
            ("rpm-ostree", ["install", rest @ ..]) => {
                for pkg in rest.iter().filter(|a| !a.starts_with('-')) {
                    state.staged_installs.insert(pkg.to_string());
                }
                success("Changes queued for next boot.\n")
            }
            ("rpm-ostree", ["uninstall", rest @ ..]) => {
                for pkg in rest.iter().filter(|a| !a.starts_with('-')) {
                    state.staged_uninstalls.insert(pkg.to_string());
                }
                success("Changes queued for next boot.\n")
            }
            ("rpm-ostree", ["override", "remove", rest @ ..]) => {
                for pkg in rest.iter().filter(|a| !a.starts_with('-')) {
                    state.staged_removals.insert(pkg.to_string());
                }
                success("Changes queued for next boot.\n")
            }
            ("ip", ["-4", "route", "get", _]) => match &state.route_src {
                Some(src) => success(&format!(
                    "1.1.1.1 via {} dev eth0 src {} uid 0\n    cache\n",
                    state.default_gateway.as_deref().unwrap_or("0.0.0.0"),
                    src
                )),
                None => failure("RTNETLINK answers: Network is unreachable"),
            },
            ("ip", ["-4", "route", "show", "default"]) => match &state.default_gateway {
                Some(gw) => success(&format!(
                    "default via {} dev eth0 proto dhcp metric 100\n",
                    gw
                )),
                None => success(""),
            },
            ("modprobe", [module]) => {
                state
                    .files
                    .insert(paths::loaded_module(module), (String::new(), 0o755));
                success("")
            }
            ("sh", ["-c", script]) if script.starts_with("command -v ") => {
                let name = script.trim_start_matches("command -v ").trim();
                if state.missing_commands.contains(name) {
                    failure("")
                } else {
                    success(&format!("/usr/bin/{}\n", name))
                }
            }
            ("curl", ["-sfL", "-o", out, _url]) => {
                state
                    .files
                    .insert(PathBuf::from(out), ("#!/bin/sh\n".to_string(), 0o644));
                success("")
            }
            ("sh", [script]) if state.files.contains_key(Path::new(script)) => {
                let bin_dir = env_value(cmd, "INSTALL_K3S_BIN_DIR").unwrap_or("/usr/local/bin");
                state
                    .files
                    .insert(Path::new(bin_dir).join("k3s"), (String::new(), 0o755));
                state.runtime_version = Some(
                    env_value(cmd, "INSTALL_K3S_VERSION")
                        .unwrap_or("v1.31.4+k3s1")
                        .to_string(),
                );
                if state.installer_writes_kubeconfig {
                    state.files.insert(
                        paths::runtime_kubeconfig(),
                        (FAKE_RUNTIME_KUBECONFIG.to_string(), 0o644),
                    );
                }
                success("[INFO]  systemd: Starting k3s\n")
            }
            ("sh", [script]) => failure(&format!("sh: {}: No such file or directory", script)),
            (program, ["--version"]) if program.ends_with("/k3s") => {
                match &state.runtime_version {
                    Some(v) => success(&format!(
                        "k3s version {} (5b2ad1d4)\ngo version go1.22.9\n",
                        v
                    )),
                    None => failure("k3s: not found"),
                }
            }
            (program, ["kubectl", "get", "nodes"]) if program.ends_with("/k3s") => {
                if state.cluster_ready {
                    success("NAME     STATUS   ROLES                  AGE   VERSION\nnode-1   Ready    control-plane,master   1m    v1.31.4+k3s1\n")
                } else {
                    failure("The connection to the server 127.0.0.1:6443 was refused")
                }
            }
            _ => success(""),
        }
    }
}

fn success(stdout: &str) -> CommandOutput {
    CommandOutput {
        success: true,
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn failure(stderr: &str) -> CommandOutput {
    CommandOutput {
        success: false,
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

fn env_value<'a>(cmd: &'a HostCommand, key: &str) -> Option<&'a str> {
    cmd.env
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn status_json(state: &State) -> String {
    let booted = serde_json::json!({
        "booted": true,
        "requested-packages": state.layered.iter().collect::<Vec<_>>(),
        "requested-base-removals": [],
    });
    let mut deployments = Vec::new();
    if !state.staged_installs.is_empty()
        || !state.staged_uninstalls.is_empty()
        || !state.staged_removals.is_empty()
    {
        let requested: Vec<&String> = state
            .layered
            .iter()
            .chain(state.staged_installs.iter())
            .filter(|pkg| !state.staged_uninstalls.contains(*pkg))
            .collect();
        deployments.push(serde_json::json!({
            "booted": false,
            "requested-packages": requested,
            "requested-base-removals": state.staged_removals.iter().collect::<Vec<_>>(),
        }));
    }
    deployments.push(booted);
    serde_json::json!({ "deployments": deployments }).to_string()
}

#[async_trait::async_trait]
impl Host for FakeHost {
    async fn run(&self, cmd: &HostCommand) -> Result<CommandOutput> {
        let mut state = self.state();
        state.commands.push(cmd.clone());
        if cmd.is_mutation() {
            state.mutations += 1;
        }
        Ok(Self::simulate(&mut state, cmd))
    }

    async fn exists(&self, path: &Path) -> bool {
        self.state().files.keys().any(|p| p.starts_with(path))
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.file(path))
    }

    async fn write_file(&self, path: &Path, contents: &str, mode: u32) -> Result<()> {
        let mut state = self.state();
        state.mutations += 1;
        state
            .files
            .insert(path.to_path_buf(), (contents.to_string(), mode));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_install_is_staged_until_reboot() {
        let host = FakeHost::new();
        let install = HostCommand::mutation("rpm-ostree", ["install", "--idempotent", "k3s-selinux"]);
        host.run(&install).await.unwrap();

        assert!(host.is_staged("k3s-selinux"));
        assert!(!host.is_installed("k3s-selinux"));

        host.reboot();
        assert!(host.is_installed("k3s-selinux"));
        assert!(!host.is_staged("k3s-selinux"));
    }

    #[tokio::test]
    async fn test_queries_do_not_count_as_mutations() {
        let host = FakeHost::new().with_route(Some("10.0.2.15"), Some("10.0.2.2"));
        host.run(&HostCommand::query("ip", ["-4", "route", "get", "1.1.1.1"]))
            .await
            .unwrap();
        assert_eq!(host.mutation_count(), 0);

        host.write_file(Path::new("/etc/x"), "y", 0o644).await.unwrap();
        assert_eq!(host.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_exists_matches_directories() {
        let host = FakeHost::new().with_file("/sys/module/overlay/refcnt", "1");
        assert!(host.exists(Path::new("/sys/module/overlay")).await);
        assert!(!host.exists(Path::new("/sys/module/br_netfilter")).await);
    }
}
