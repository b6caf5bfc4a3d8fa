use anyhow::{Context, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{CommandOutput, Host, HostCommand};

/// The machine this process runs on
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

#[async_trait::async_trait]
impl Host for SystemHost {
    async fn run(&self, cmd: &HostCommand) -> Result<CommandOutput> {
        debug!(command = %cmd, kind = ?cmd.kind, "running");

        let output = Command::new(&cmd.program)
            .args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .await
            .with_context(|| format!("spawning {}", cmd.program))?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok()
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn write_file(&self, path: &Path, contents: &str, mode: u32) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        // New files are created with `mode`; existing ones are narrowed before
        // the new contents land
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        file.set_permissions(std::fs::Permissions::from_mode(mode))
            .await
            .with_context(|| format!("setting permissions on {}", path.display()))?;
        file.write_all(contents.as_bytes())
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        debug!(path = %path.display(), mode = format!("{:o}", mode), "wrote file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("etc/sysctl.d/90-k3s.conf");
        let host = SystemHost;

        assert!(host.read_file(&path).await.unwrap().is_none());
        assert!(!host.exists(&path).await);

        host.write_file(&path, "net.ipv4.ip_forward = 1\n", 0o600)
            .await
            .unwrap();

        assert!(host.exists(&path).await);
        assert_eq!(
            host.read_file(&path).await.unwrap().as_deref(),
            Some("net.ipv4.ip_forward = 1\n")
        );
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_write_narrows_existing_file_mode() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kube/config");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        SystemHost.write_file(&path, "new", 0o600).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_run_captures_exit_status() {
        let host = SystemHost;
        let ok = host
            .run(&HostCommand::query("sh", ["-c", "echo hello"]))
            .await
            .unwrap();
        assert!(ok.success);
        assert_eq!(ok.stdout.trim(), "hello");

        let failed = host
            .run(&HostCommand::query("sh", ["-c", "exit 3"]))
            .await
            .unwrap();
        assert!(!failed.success);
        assert_eq!(failed.code, Some(3));
    }

    #[tokio::test]
    async fn test_run_passes_env() {
        let host = SystemHost;
        let out = host
            .run(&HostCommand::query("sh", ["-c", "echo $PROVISION_TEST"]).env("PROVISION_TEST", "yes"))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "yes");
    }

    #[tokio::test]
    async fn test_run_missing_program_is_error() {
        let host = SystemHost;
        let result = host
            .run(&HostCommand::query("definitely-not-a-real-binary-xyz", ["--version"]))
            .await;
        assert!(result.is_err());
    }
}
