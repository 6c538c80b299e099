//! In-memory `Multiplexer` for tests across the workspace.
//! Enabled by the `test-support` feature.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TmuxError;
use crate::multiplexer::{Key, Multiplexer};
use crate::session_info::TmuxSessionInfo;

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Create(String),
    Rename { from: String, to: String },
    Keys { target: String, text: String },
    Key { target: String, key: Key },
}

#[derive(Default)]
struct FakeState {
    sessions: Vec<String>,
    calls: Vec<FakeCall>,
    failing_keys: HashSet<Key>,
    failing_text: bool,
    list_error: bool,
}

/// Sessions live in a `Vec<String>`; sends to unknown names fail with
/// [`TmuxError::NoSuchSession`] just like tmux does.
#[derive(Default)]
pub struct FakeMultiplexer {
    state: Mutex<FakeState>,
    /// Added before every send, to model a slow in-flight tmux call.
    send_latency: Mutex<Duration>,
}

impl FakeMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions<I, S>(sessions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fake = Self::new();
        fake.lock().sessions = sessions.into_iter().map(Into::into).collect();
        fake
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_session(&self, raw_id: impl Into<String>) {
        self.lock().sessions.push(raw_id.into());
    }

    pub fn remove_session(&self, raw_id: &str) {
        self.lock().sessions.retain(|s| s != raw_id);
    }

    pub fn session_names(&self) -> Vec<String> {
        self.lock().sessions.clone()
    }

    /// Make every send of `key` fail with a generic command error.
    pub fn fail_key(&self, key: Key) {
        self.lock().failing_keys.insert(key);
    }

    /// Make every literal text send fail with a generic command error.
    pub fn fail_text(&self) {
        self.lock().failing_text = true;
    }

    pub fn fail_list(&self) {
        self.lock().list_error = true;
    }

    pub fn set_send_latency(&self, latency: Duration) {
        *self
            .send_latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = latency;
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    /// Literal texts typed into `target`, in order.
    pub fn texts_sent_to(&self, target: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                FakeCall::Keys { target: t, text } if t == target => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Keys pressed in `target`, in order.
    pub fn keys_sent_to(&self, target: &str) -> Vec<Key> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                FakeCall::Key { target: t, key } if t == target => Some(*key),
                _ => None,
            })
            .collect()
    }

    async fn latency(&self) {
        let latency = *self
            .send_latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

fn command_failed(stderr: &str) -> TmuxError {
    TmuxError::CommandFailed {
        code: Some(1),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl Multiplexer for FakeMultiplexer {
    async fn list_sessions(&self) -> Result<Vec<TmuxSessionInfo>, TmuxError> {
        let state = self.lock();
        if state.list_error {
            return Err(command_failed("server exited unexpectedly"));
        }
        Ok(state
            .sessions
            .iter()
            .map(|name| TmuxSessionInfo {
                name: name.clone(),
                windows: 1,
                attached: false,
                created: Some(0),
            })
            .collect())
    }

    async fn create_session(&self, raw_id: &str) -> Result<(), TmuxError> {
        let mut state = self.lock();
        state.calls.push(FakeCall::Create(raw_id.to_string()));
        if state.sessions.iter().any(|s| s == raw_id) {
            return Err(command_failed(&format!("duplicate session: {raw_id}")));
        }
        state.sessions.push(raw_id.to_string());
        Ok(())
    }

    async fn rename_session(&self, raw_id: &str, new_raw_id: &str) -> Result<(), TmuxError> {
        let mut state = self.lock();
        state.calls.push(FakeCall::Rename {
            from: raw_id.to_string(),
            to: new_raw_id.to_string(),
        });
        match state.sessions.iter_mut().find(|s| *s == raw_id) {
            Some(slot) => {
                *slot = new_raw_id.to_string();
                Ok(())
            }
            None => Err(TmuxError::NoSuchSession(raw_id.to_string())),
        }
    }

    async fn send_keys(&self, raw_id: &str, text: &str) -> Result<(), TmuxError> {
        self.latency().await;
        let mut state = self.lock();
        state.calls.push(FakeCall::Keys {
            target: raw_id.to_string(),
            text: text.to_string(),
        });
        if !state.sessions.iter().any(|s| s == raw_id) {
            return Err(TmuxError::NoSuchSession(raw_id.to_string()));
        }
        if state.failing_text {
            return Err(command_failed("send-keys failed"));
        }
        Ok(())
    }

    async fn send_key(&self, raw_id: &str, key: Key) -> Result<(), TmuxError> {
        self.latency().await;
        let mut state = self.lock();
        state.calls.push(FakeCall::Key {
            target: raw_id.to_string(),
            key,
        });
        if !state.sessions.iter().any(|s| s == raw_id) {
            return Err(TmuxError::NoSuchSession(raw_id.to_string()));
        }
        if state.failing_keys.contains(&key) {
            return Err(command_failed("send-keys failed"));
        }
        Ok(())
    }
}
