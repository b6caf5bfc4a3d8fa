//! Narrow interface to the machine being provisioned.
//!
//! Every step reads and mutates the host only through [`Host`]: running
//! external commands and reading/writing files. [`SystemHost`] talks to the
//! real machine; `FakeHost` (feature `test-utils`) is an in-memory stand-in
//! that simulates the package database, kernel module table, and filesystem.

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;
pub mod system;

#[cfg(any(test, feature = "test-utils"))]
pub use fake::FakeHost;
pub use system::SystemHost;

use anyhow::Result;
use std::path::Path;

/// Whether a command only observes host state or changes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Query,
    Mutation,
}

/// An external command to run on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub kind: CommandKind,
}

impl HostCommand {
    fn new<I, S>(program: &str, args: I, kind: CommandKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            kind,
        }
    }

    /// A side-effect free command (package query, route lookup, ...)
    pub fn query<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(program, args, CommandKind::Query)
    }

    /// A command that changes host state
    pub fn mutation<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(program, args, CommandKind::Mutation)
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn is_mutation(&self) -> bool {
        self.kind == CommandKind::Mutation
    }
}

impl std::fmt::Display for HostCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait::async_trait]
pub trait Host: Send + Sync {
    /// Run a command to completion.
    ///
    /// Returns `Err` only when the command could not be started. A non-zero
    /// exit is reported through [`CommandOutput::success`].
    async fn run(&self, cmd: &HostCommand) -> Result<CommandOutput>;

    /// Whether a file or directory exists at `path`
    async fn exists(&self, path: &Path) -> bool;

    /// Read a UTF-8 file. `Ok(None)` when it does not exist.
    async fn read_file(&self, path: &Path) -> Result<Option<String>>;

    /// Write a file, creating parent directories, and set its permission bits
    async fn write_file(&self, path: &Path, contents: &str, mode: u32) -> Result<()>;
}

/// Run a command and fail if it exits non-zero
pub async fn run_checked(host: &dyn Host, cmd: &HostCommand) -> Result<CommandOutput> {
    let output = host.run(cmd).await?;
    if !output.success {
        anyhow::bail!(
            "`{}` failed (exit {}): {}",
            cmd,
            output
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            output.stderr.trim()
        );
    }
    Ok(output)
}

/// Run a query and report only whether it exited zero
pub async fn succeeds(host: &dyn Host, cmd: &HostCommand) -> bool {
    matches!(host.run(cmd).await, Ok(output) if output.success)
}

/// True when `path` holds exactly `expected`
pub async fn file_matches(host: &dyn Host, path: &Path, expected: &str) -> Result<bool> {
    Ok(host.read_file(path).await?.as_deref() == Some(expected))
}
