//! Multiplexer adapter: the session-level operations the control plane needs,
//! expressed over a `TmuxCommandRunner`.
//!
//! Sessions are always addressed by their raw name through tmux's exact-match
//! target syntax (`=name`), so `agent1` never resolves to `agent10` and names
//! carrying zero-width markers are matched byte for byte.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TmuxError;
use crate::executor::TmuxCommandRunner;
use crate::session_info::{LIST_SESSIONS_FORMAT, TmuxSessionInfo, parse_list_sessions_output};

/// Non-literal keys the control plane sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Enter,
    /// Ctrl-C.
    Interrupt,
}

impl Key {
    pub fn as_tmux(self) -> &'static str {
        match self {
            Self::Enter => "Enter",
            Self::Interrupt => "C-c",
        }
    }
}

#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Every live session. A missing tmux server is an empty list.
    async fn list_sessions(&self) -> Result<Vec<TmuxSessionInfo>, TmuxError>;

    /// Create a detached session named `raw_id`.
    async fn create_session(&self, raw_id: &str) -> Result<(), TmuxError>;

    async fn rename_session(&self, raw_id: &str, new_raw_id: &str) -> Result<(), TmuxError>;

    /// Type `text` literally into the session's active pane.
    async fn send_keys(&self, raw_id: &str, text: &str) -> Result<(), TmuxError>;

    async fn send_key(&self, raw_id: &str, key: Key) -> Result<(), TmuxError>;

    /// Type `command` and press Enter.
    async fn run_command(&self, raw_id: &str, command: &str) -> Result<(), TmuxError> {
        self.send_keys(raw_id, command).await?;
        self.send_key(raw_id, Key::Enter).await
    }

    /// Type `text`, wait `submit_delay` so TUIs finish consuming the paste,
    /// then press Enter.
    async fn send_message(
        &self,
        raw_id: &str,
        text: &str,
        submit_delay: Duration,
    ) -> Result<(), TmuxError> {
        self.send_keys(raw_id, text).await?;
        if !submit_delay.is_zero() {
            tokio::time::sleep(submit_delay).await;
        }
        self.send_key(raw_id, Key::Enter).await
    }
}

/// `Multiplexer` backed by real tmux invocations.
pub struct TmuxMultiplexer<R> {
    runner: R,
}

impl<R: TmuxCommandRunner> TmuxMultiplexer<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

fn session_target(raw_id: &str) -> String {
    format!("={raw_id}")
}

/// Active pane of the session.
fn pane_target(raw_id: &str) -> String {
    format!("={raw_id}:")
}

#[async_trait]
impl<R: TmuxCommandRunner> Multiplexer for TmuxMultiplexer<R> {
    async fn list_sessions(&self) -> Result<Vec<TmuxSessionInfo>, TmuxError> {
        match self
            .runner
            .run(&["list-sessions", "-F", LIST_SESSIONS_FORMAT])
            .await
        {
            Ok(output) => parse_list_sessions_output(&output),
            Err(e) if e.is_no_server() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn create_session(&self, raw_id: &str) -> Result<(), TmuxError> {
        self.runner
            .run(&["new-session", "-d", "-s", raw_id])
            .await?;
        tracing::debug!(session = %raw_id.escape_default(), "created session");
        Ok(())
    }

    async fn rename_session(&self, raw_id: &str, new_raw_id: &str) -> Result<(), TmuxError> {
        let target = session_target(raw_id);
        self.runner
            .run(&["rename-session", "-t", &target, new_raw_id])
            .await
            .map_err(|e| e.for_target(raw_id))?;
        Ok(())
    }

    async fn send_keys(&self, raw_id: &str, text: &str) -> Result<(), TmuxError> {
        let target = pane_target(raw_id);
        self.runner
            .run(&["send-keys", "-t", &target, "-l", text])
            .await
            .map_err(|e| e.for_target(raw_id))?;
        Ok(())
    }

    async fn send_key(&self, raw_id: &str, key: Key) -> Result<(), TmuxError> {
        let target = pane_target(raw_id);
        self.runner
            .run(&["send-keys", "-t", &target, key.as_tmux()])
            .await
            .map_err(|e| e.for_target(raw_id))?;
        Ok(())
    }
}
