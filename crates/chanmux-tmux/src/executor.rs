//! TmuxCommandRunner trait and TmuxExecutor (async subprocess wrapper).
//! Every call spawns exactly one tmux process and is bounded by a timeout.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TmuxError;

/// Upper bound for a single tmux invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Trait for executing tmux commands. Enables mock injection for testing.
#[async_trait]
pub trait TmuxCommandRunner: Send + Sync {
    /// Run `tmux <args>` and return stdout.
    async fn run(&self, args: &[&str]) -> Result<String, TmuxError>;
}

#[async_trait]
impl<T: TmuxCommandRunner + ?Sized> TmuxCommandRunner for Arc<T> {
    async fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        (**self).run(args).await
    }
}

/// Real tmux executor using `tokio::process::Command`.
#[derive(Debug, Clone)]
pub struct TmuxExecutor {
    tmux_bin: String,
    socket_path: Option<String>,
    socket_name: Option<String>,
    timeout: Duration,
}

impl TmuxExecutor {
    pub fn new(tmux_bin: impl Into<String>) -> Self {
        Self {
            tmux_bin: tmux_bin.into(),
            socket_path: None,
            socket_name: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_socket_name(mut self, name: impl Into<String>) -> Self {
        self.socket_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TmuxExecutor {
    fn default() -> Self {
        Self::new("tmux")
    }
}

#[async_trait]
impl TmuxCommandRunner for TmuxExecutor {
    async fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        let mut cmd = tokio::process::Command::new(&self.tmux_bin);
        // Socket path takes precedence over socket name
        if let Some(ref path) = self.socket_path {
            cmd.args(["-S", path.as_str()]);
        } else if let Some(ref name) = self.socket_name {
            cmd.args(["-L", name.as_str()]);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let subcommand = args.first().copied().unwrap_or_default();
        tracing::trace!(subcommand, "spawning tmux");

        // Dropping the `output()` future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TmuxError::NotFound(self.tmux_bin.clone()));
            }
            Ok(Err(e)) => return Err(TmuxError::Spawn(e)),
            Err(_) => {
                tracing::warn!(subcommand, timeout_ms = self.timeout.as_millis() as u64, "tmux timed out");
                return Err(TmuxError::Timeout {
                    command: subcommand.to_string(),
                    after: self.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TmuxError::CommandFailed {
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
