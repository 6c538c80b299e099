//! Error types for the tmux backend.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("tmux binary not found: {0}")]
    NotFound(String),

    #[error("failed to spawn tmux: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("tmux {command} timed out after {}ms", .after.as_millis())]
    Timeout { command: String, after: Duration },

    #[error("tmux exited {}: {stderr}", .code.map_or_else(|| "by signal".to_string(), |c| c.to_string()))]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("no such session: {0:?}")]
    NoSuchSession(String),

    #[error("failed to parse list-sessions line {line_num}: {detail}")]
    ParseError { line_num: usize, detail: String },
}

/// stderr fragments tmux prints when the targeted session (or the whole
/// server) is absent.
const MISSING_SESSION_PATTERNS: &[&str] = &[
    "can't find session",
    "can't find window",
    "can't find pane",
    "session not found",
    "no server running",
    "error connecting to",
];

impl TmuxError {
    /// True when tmux could not be started at all.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Spawn(_))
    }

    /// True when tmux reports that nothing is listening (no sessions exist).
    pub fn is_no_server(&self) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => {
                stderr.contains("no server running") || stderr.contains("error connecting to")
            }
            _ => false,
        }
    }

    /// Re-label a failed command aimed at `raw_id` as [`TmuxError::NoSuchSession`]
    /// when stderr says the target is missing. Other errors pass through.
    pub fn for_target(self, raw_id: &str) -> Self {
        match &self {
            Self::CommandFailed { stderr, .. }
                if MISSING_SESSION_PATTERNS.iter().any(|p| stderr.contains(p)) =>
            {
                Self::NoSuchSession(raw_id.to_string())
            }
            _ => self,
        }
    }
}
