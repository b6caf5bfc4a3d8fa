use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::network::Ipv4Subnet;
use crate::paths;

/// Config file name
pub const CONFIG_FILE: &str = "provision-config.toml";

/// Embedded default config (written by `init-config`)
pub const EMBEDDED_CONFIG: &str = include_str!("../provision-config.toml");

const APP_NAME: &str = "k3s-provision";

// ============================================================================
// Config File Data Structures
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub packages: PackagesConfig,
    #[serde(default)]
    pub kernel: KernelConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub kubeconfig: KubeconfigConfig,
}

/// Package sets applied through rpm-ostree. Every change here needs a reboot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackagesConfig {
    pub selinux: Vec<String>,
    pub selinux_repo_baseurl: String,
    pub selinux_repo_gpgkey: String,
    pub required: Vec<String>,
    pub conflicting: Vec<String>,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            selinux: vec!["k3s-selinux".to_string()],
            selinux_repo_baseurl: "https://rpm.rancher.io/k3s/stable/common/coreos/noarch"
                .to_string(),
            selinux_repo_gpgkey: "https://rpm.rancher.io/public.key".to_string(),
            required: vec!["container-selinux".to_string(), "iptables-nft".to_string()],
            conflicting: vec!["moby-engine".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    pub modules: Vec<String>,
    pub sysctl: BTreeMap<String, String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        let sysctl = [
            ("net.bridge.bridge-nf-call-ip6tables", "1"),
            ("net.bridge.bridge-nf-call-iptables", "1"),
            ("net.ipv4.ip_forward", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            modules: vec!["br_netfilter".to_string(), "overlay".to_string()],
            sysctl,
        }
    }
}

/// Heuristics used to recognise hypervisor NAT networking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub nat_subnet: Ipv4Subnet,
    pub nat_gateway: Ipv4Addr,
    pub probe_address: Ipv4Addr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            nat_subnet: Ipv4Subnet::new(Ipv4Addr::new(10, 0, 2, 0), 24),
            nat_gateway: Ipv4Addr::new(10, 0, 2, 2),
            probe_address: Ipv4Addr::new(1, 1, 1, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub installer_url: String,
    pub bin_path: PathBuf,
    pub write_kubeconfig_mode: String,
    pub tls_san: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            installer_url: "https://get.k3s.io".to_string(),
            bin_path: PathBuf::from("/usr/local/bin/k3s"),
            write_kubeconfig_mode: "0644".to_string(),
            tls_san: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KubeconfigConfig {
    #[serde(default = "default_kubeconfig_output")]
    pub output: String,
    #[serde(default = "default_kubeconfig_wait_secs")]
    pub wait_secs: u64,
}

fn default_kubeconfig_output() -> String {
    "~/.kube/config".to_string()
}

fn default_kubeconfig_wait_secs() -> u64 {
    60
}

impl Default for KubeconfigConfig {
    fn default() -> Self {
        Self {
            output: default_kubeconfig_output(),
            wait_secs: default_kubeconfig_wait_secs(),
        }
    }
}

impl KubeconfigConfig {
    /// Output path with `~` expanded to the invoking user's home.
    ///
    /// Under sudo the kubeconfig belongs to the user who ran sudo, not root.
    pub fn output_path(&self) -> PathBuf {
        if let Some(rest) = self.output.strip_prefix("~/") {
            if let Some(home) = invoking_user().and_then(|user| user_home(&user)) {
                return home.join(rest);
            }
        }
        PathBuf::from(shellexpand::tilde(&self.output).as_ref())
    }
}

/// The non-root user who invoked us through sudo, if any
pub fn invoking_user() -> Option<String> {
    std::env::var("SUDO_USER")
        .ok()
        .filter(|user| !user.is_empty() && user != "root")
}

/// Home directory of `name` from the passwd database
pub fn user_home(name: &str) -> Option<PathBuf> {
    match nix::unistd::User::from_name(name) {
        Ok(Some(user)) => Some(user.dir),
        Ok(None) => {
            debug!("SUDO_USER '{}' not found in passwd database", name);
            None
        }
        Err(e) => {
            debug!("Failed to lookup SUDO_USER '{}': {}", name, e);
            None
        }
    }
}

// ============================================================================
// Config File Loading
// ============================================================================

/// A parsed config and where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ProvisionConfig,
    /// `None` when built-in defaults were used
    pub source: Option<PathBuf>,
    /// First 12 hex chars of the SHA-256 of the file content
    pub sha_short: String,
}

/// Generate default config file at XDG config directory.
///
/// Writes the embedded default config to ~/.config/k3s-provision/provision-config.toml
pub fn generate_config(force: bool) -> Result<PathBuf> {
    let proj_dirs =
        ProjectDirs::from("", "", APP_NAME).context("Could not determine config directory")?;
    write_default_config(proj_dirs.config_dir(), force)
}

/// Write the embedded default config into `dir`
pub fn write_default_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILE);

    if config_path.exists() && !force {
        bail!(
            "Config file already exists at {}\n\n\
             Use --force to overwrite, or edit the existing file.",
            config_path.display()
        );
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating config directory: {}", dir.display()))?;
    std::fs::write(&config_path, EMBEDDED_CONFIG)
        .with_context(|| format!("writing config file: {}", config_path.display()))?;

    info!("Generated config at {}", config_path.display());
    Ok(config_path)
}

/// Find the config file using the lookup chain.
///
/// Lookup order:
/// 1. Explicit path (--config / K3S_PROVISION_CONFIG), which must exist
/// 2. SUDO_USER's config (when running with sudo, use invoking user's config)
/// 3. XDG user config (~/.config/k3s-provision/provision-config.toml)
/// 4. System config (/etc/k3s-provision/provision-config.toml)
///
/// Returns `None` when nothing is found; callers fall back to built-in defaults.
pub fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit_path {
        let p = PathBuf::from(path);
        if !p.exists() {
            bail!("Config file not found: {}", path);
        }
        return Ok(Some(p));
    }

    if let Some(home) = invoking_user().and_then(|user| user_home(&user)) {
        let p = home.join(".config").join(APP_NAME).join(CONFIG_FILE);
        if p.exists() {
            return Ok(Some(p));
        }
    }

    if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
        let p = proj_dirs.config_dir().join(CONFIG_FILE);
        if p.exists() {
            return Ok(Some(p));
        }
    }

    let system = paths::system_config_dir().join(CONFIG_FILE);
    if system.exists() {
        return Ok(Some(system));
    }

    Ok(None)
}

/// Parse config text
pub fn parse_config(content: &str) -> Result<ProvisionConfig> {
    toml::from_str(content).context("parsing config")
}

/// Load the config from the lookup chain, or built-in defaults
pub fn load_config(explicit_path: Option<&str>) -> Result<LoadedConfig> {
    let Some(config_path) = find_config_file(explicit_path)? else {
        info!("no config file found, using built-in defaults");
        return Ok(LoadedConfig {
            config: ProvisionConfig::default(),
            source: None,
            sha_short: compute_sha256_short(EMBEDDED_CONFIG.as_bytes()),
        });
    };

    let config_content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("reading config file: {}", config_path.display()))?;

    let config = parse_config(&config_content)
        .with_context(|| format!("in config file: {}", config_path.display()))?;
    let sha_short = compute_sha256_short(config_content.as_bytes());

    info!(
        config_file = %config_path.display(),
        config_sha = %sha_short,
        "loaded provision config"
    );

    Ok(LoadedConfig {
        config,
        source: Some(config_path),
        sha_short,
    })
}

/// Compute SHA256 of bytes, return hex string (first 12 chars)
fn compute_sha256_short(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(&result[..6])
}
