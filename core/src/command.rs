//! External command execution
//!
//! Every DAOS tool, the agent and fio are driven through the [`CommandRunner`]
//! trait so the managers stay independent of how processes are launched.
//! [`SystemRunner`] is the tokio-backed implementation used by the CLI.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// A fully specified external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable path
    pub program: PathBuf,
    /// Arguments, passed verbatim
    pub args: Vec<String>,
    /// Extra environment variables for this invocation only
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    /// Start a command for the given executable
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument
    pub fn path_arg(self, path: &Path) -> Self {
        let rendered = path.display().to_string();
        self.arg(rendered)
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for this invocation
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Shell-quoted rendering used in logs and error reports
    pub fn display(&self) -> String {
        let mut words: Vec<String> = self
            .envs
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        words.push(self.program.display().to_string());
        words.extend(self.args.iter().cloned());

        shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stdout
    pub fn failure(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Whether the command exited with status 0
    pub fn succeeded(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        let mut text = self.stdout.clone();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&self.stderr);
        text
    }
}

/// Process execution seam used by every manager
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output
    async fn output(&self, command: &CommandSpec) -> io::Result<CommandOutput>;

    /// Start a background process and return its pid without waiting
    async fn spawn_detached(&self, command: &CommandSpec) -> io::Result<u32>;

    /// Forcefully terminate a process by pid
    async fn kill(&self, pid: u32) -> io::Result<()>;

    /// Run to completion, forwarding each stdout line to `lines` as it arrives
    ///
    /// The sender is dropped when the child's stdout reaches end-of-data, which
    /// is the only signal the consumer gets. The returned output holds the full
    /// captured stdout.
    async fn stream(
        &self,
        command: &CommandSpec,
        lines: mpsc::Sender<String>,
    ) -> io::Result<CommandOutput>;
}

/// Runs commands as real child processes via `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    environment: Option<HashMap<String, String>>,
}

impl SystemRunner {
    /// Runner that inherits the current process environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner whose children see exactly `environment`
    ///
    /// Used with the map produced by [`crate::env::EnvFile::load`] so the
    /// sourced definitions reach every tool without touching this process's
    /// own environment.
    pub fn with_environment(environment: HashMap<String, String>) -> Self {
        Self {
            environment: Some(environment),
        }
    }

    fn command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(environment) = &self.environment {
            cmd.env_clear().envs(environment);
        }
        for (key, value) in &spec.envs {
            cmd.env(key, value);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        tracing::debug!(command = %spec, "Running command");

        let output = self
            .command(spec)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn spawn_detached(&self, spec: &CommandSpec) -> io::Result<u32> {
        tracing::debug!(command = %spec, "Spawning background command");

        let mut child = self.command(spec).stdin(Stdio::null()).spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("spawned process exited before reporting a pid"))?;

        // Reap the child whenever it exits so it never lingers as a zombie.
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::debug!(pid, %status, "Background process exited"),
                Err(e) => tracing::warn!(pid, error = %e, "Failed to wait on background process"),
            }
        });

        Ok(pid)
    }

    #[cfg(unix)]
    async fn kill(&self, pid: u32) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        kill(Pid::from_raw(raw), Signal::SIGKILL).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    async fn kill(&self, _pid: u32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "killing by pid is only supported on unix",
        ))
    }

    async fn stream(
        &self,
        spec: &CommandSpec,
        lines: mpsc::Sender<String>,
    ) -> io::Result<CommandOutput> {
        tracing::debug!(command = %spec, "Streaming command");

        let mut child = self
            .command(spec)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("failed to capture child stdout"))?;

        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        let mut captured = String::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    // The child must not outlive a failed read.
                    tracing::warn!(command = %spec, error = %e, "Lost child stdout, killing");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Err(e);
                }
            }
            let line = String::from_utf8_lossy(&buf)
                .trim_end_matches(['\n', '\r'])
                .to_string();
            captured.push_str(&line);
            captured.push('\n');
            // A closed display must not stall the child, keep draining.
            let _ = lines.send(line).await;
        }
        drop(lines);

        let status = child.wait().await?;

        Ok(CommandOutput {
            code: status.code(),
            stdout: captured,
            stderr: String::new(),
        })
    }
}
