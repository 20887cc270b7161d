//! Host command execution.
//!
//! Every interaction with the host's network stack (probing for 802.1Q
//! support, listing links, creating and deleting VLAN children) goes through
//! the [`HostCommand`] capability. The daemon uses [`ProcessRunner`]; tests
//! substitute in-memory fakes.
//!
//! Commands are executed directly (argv style), never through a shell, so
//! interface names coming from metadata need no quoting.
//!
//! # Example
//!
//! ```ignore
//! use vlansync_common::shell::{self, ExecContext, ProcessRunner, IP_CMD};
//!
//! let runner = ProcessRunner::new();
//! let ctx = ExecContext::new();
//! let stdout = shell::exec_or_fail(&runner, IP_CMD, &["-j", "link", "show"], &ctx).await?;
//! ```

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{VlanError, VlanResult};

/// Path to the `ip` command for network interface configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// Path to the `modinfo` command used to probe for the 802.1Q module.
pub const MODINFO_CMD: &str = "/sbin/modinfo";

/// Result of a host command execution.
///
/// Only `exit_code` decides success; `stderr` is kept for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The captured stdout output.
    pub stdout: String,
    /// The captured stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Successful result carrying `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed result with the given exit code and `stderr`.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Cancellation and deadline carried through every host command of a pass.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl ExecContext {
    /// Context with a fresh cancellation token and no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `token` as the cancellation signal.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Applies a per-command deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The cancellation token observed by commands run under this context.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Per-command deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Capability to run a named host command.
///
/// Implementations return `Ok` for any command that ran to completion,
/// whatever its exit code. `Err` is reserved for commands that could not be
/// started, were cancelled, or ran past their deadline.
#[async_trait]
pub trait HostCommand: Send + Sync {
    /// Runs `name` with `args` under `ctx`.
    async fn execute(&self, name: &str, args: &[&str], ctx: &ExecContext)
        -> VlanResult<ExecResult>;
}

#[async_trait]
impl<T: HostCommand + ?Sized> HostCommand for Arc<T> {
    async fn execute(
        &self,
        name: &str,
        args: &[&str],
        ctx: &ExecContext,
    ) -> VlanResult<ExecResult> {
        (**self).execute(name, args, ctx).await
    }
}

/// Renders a command line for logs and error messages.
pub fn command_line(name: &str, args: &[&str]) -> String {
    if args.is_empty() {
        name.to_string()
    } else {
        format!("{} {}", name, args.join(" "))
    }
}

/// Runs a command and turns a non-zero exit into an error.
///
/// # Returns
///
/// * `Ok(String)` - The stdout output on success
/// * `Err(VlanError::CommandFailed)` - If the command returns non-zero
pub async fn exec_or_fail<H: HostCommand + ?Sized>(
    host: &H,
    name: &str,
    args: &[&str],
    ctx: &ExecContext,
) -> VlanResult<String> {
    let result = host.execute(name, args, ctx).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(VlanError::CommandFailed {
            command: command_line(name, args),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}

/// [`HostCommand`] backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostCommand for ProcessRunner {
    async fn execute(
        &self,
        name: &str,
        args: &[&str],
        ctx: &ExecContext,
    ) -> VlanResult<ExecResult> {
        let command = command_line(name, args);
        tracing::debug!(command = %command, "Executing host command");

        if ctx.is_cancelled() {
            return Err(VlanError::Cancelled { command });
        }

        // kill_on_drop reaps the child when cancellation or the deadline
        // drops the wait future.
        let child = Command::new(name)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VlanError::Spawn {
                command: command.clone(),
                source: e,
            })?;

        let wait = async {
            let output = match ctx.timeout() {
                Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                    .await
                    .map_err(|_| VlanError::Timeout {
                        command: command.clone(),
                        timeout: limit,
                    })?,
                None => child.wait_with_output().await,
            };
            output.map_err(VlanError::from)
        };

        let output = tokio::select! {
            biased;
            _ = ctx.cancel_token().cancelled() => {
                tracing::warn!(command = %command, "Host command cancelled");
                return Err(VlanError::Cancelled { command: command.clone() });
            }
            output = wait => output?,
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let result = ExecResult {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };

        if result.success() {
            tracing::trace!(command = %command, exit_code = exit_code, "Command succeeded");
        } else {
            tracing::debug!(
                command = %command,
                exit_code = exit_code,
                stderr = %result.stderr,
                "Command returned non-zero"
            );
        }

        Ok(result)
    }
}
