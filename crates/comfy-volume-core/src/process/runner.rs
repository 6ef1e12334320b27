//! External command execution with timeouts.
//!
//! Used for git, pip, node install scripts, and the volume refresh command.
//! Children are spawned with `kill_on_drop`, so a timed-out command does not
//! outlive the request that started it.

use crate::{Result, VolumeError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// A command to run.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
        }
    }

    /// Build from an argv list; the first element is the program.
    pub fn from_argv(argv: &[String], timeout: Duration) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| VolumeError::validation("command", "empty command line"))?;
        Ok(Self::new(program.clone(), timeout).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Shell-like rendering for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Last non-empty stderr line, falling back to stdout.
    pub fn summary(&self) -> String {
        let pick = |s: &str| {
            s.lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
        };
        pick(&self.stderr)
            .or_else(|| pick(&self.stdout))
            .unwrap_or_else(|| format!("exit code {:?}", self.code))
    }
}

/// Run a command to completion.
///
/// Spawn failures map to [`VolumeError::CommandFailed`], an expired timeout to
/// [`VolumeError::Timeout`]. A non-zero exit is NOT an error; inspect
/// [`CommandOutput::success`].
pub async fn run_command(spec: &CommandSpec) -> Result<CommandOutput> {
    debug!("Running `{}`", spec.display());

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    let child = cmd.spawn().map_err(|e| VolumeError::CommandFailed {
        command: spec.display(),
        message: format!("failed to start: {}", e),
    })?;

    let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| VolumeError::CommandFailed {
            command: spec.display(),
            message: e.to_string(),
        })?,
        Err(_) => {
            warn!("`{}` timed out after {:?}", spec.display(), spec.timeout);
            return Err(VolumeError::Timeout(spec.timeout));
        }
    };

    let output = CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    if !output.success() {
        debug!("`{}` exited with {:?}", spec.display(), output.code);
    }
    Ok(output)
}

/// Run a command and turn a non-zero exit into [`VolumeError::CommandFailed`].
pub async fn run_checked(spec: &CommandSpec) -> Result<CommandOutput> {
    let output = run_command(spec).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(VolumeError::CommandFailed {
            command: spec.display(),
            message: output.summary(),
        })
    }
}
