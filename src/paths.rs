use std::path::PathBuf;

/// Directory holding the runtime's own configuration and credentials
pub fn runtime_config_dir() -> PathBuf {
    PathBuf::from("/etc/rancher/k3s")
}

/// Runtime configuration read by the k3s service at start
pub fn runtime_config() -> PathBuf {
    runtime_config_dir().join("config.yaml")
}

/// Credentials file written by the runtime after it starts
pub fn runtime_kubeconfig() -> PathBuf {
    runtime_config_dir().join("k3s.yaml")
}

/// Package repository providing the SELinux policy package
pub fn selinux_repo() -> PathBuf {
    PathBuf::from("/etc/yum.repos.d/rancher-k3s-common.repo")
}

/// Modules loaded at boot by systemd-modules-load
pub fn modules_load_conf() -> PathBuf {
    PathBuf::from("/etc/modules-load.d/k3s.conf")
}

/// Kernel parameters applied at boot by systemd-sysctl
pub fn sysctl_conf() -> PathBuf {
    PathBuf::from("/etc/sysctl.d/90-k3s.conf")
}

/// Presence of this directory means the module is loaded
pub fn loaded_module(name: &str) -> PathBuf {
    PathBuf::from("/sys/module").join(name)
}

/// Where the runtime installer script is downloaded before it runs
pub fn installer_script() -> PathBuf {
    PathBuf::from("/var/tmp/k3s-install.sh")
}

/// System-wide config file location
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc/k3s-provision")
}
