//! Task specs, status snapshots and registry configuration.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// ─── Kind / state ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Timer,
    Cycle,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Cycle => "cycle",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `stop` was called.
    Requested,
    /// A newer task with the same name took over.
    Replaced,
    /// The target session no longer exists.
    TargetGone,
    /// The registry was shut down.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Cancel and await the running task, then install the new one.
    #[default]
    Replace,
    /// Refuse with `TaskError::DuplicateName`.
    Reject,
}

// ─── Specs ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSpec {
    /// Raw tmux session name.
    pub session_id: String,
    pub message: String,
    pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSpec {
    /// Raw tmux session name.
    pub session_id: String,
    pub interval: Duration,
    /// Wait before the first sequence.
    pub initial_delay: Duration,
}

/// The fixed auto-cycle sequence: interrupt ×N, pause, reconnect, pause, resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSteps {
    pub interrupt_count: u32,
    pub interrupt_spacing: Duration,
    pub pause_before_reconnect: Duration,
    pub reconnect_command: String,
    pub pause_before_resume: Duration,
    pub resume_command: String,
}

pub const DEFAULT_RECONNECT_COMMAND: &str = "mullvad reconnect";
pub const DEFAULT_RESUME_COMMAND: &str = "claudex -c";

impl Default for CycleSteps {
    fn default() -> Self {
        Self {
            interrupt_count: 5,
            interrupt_spacing: Duration::from_millis(200),
            pause_before_reconnect: Duration::from_secs(1),
            reconnect_command: DEFAULT_RECONNECT_COMMAND.to_string(),
            pause_before_resume: Duration::from_secs(3),
            resume_command: DEFAULT_RESUME_COMMAND.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub duplicate_policy: DuplicatePolicy,
    /// Gap between typing a timer message and pressing Enter.
    pub submit_delay: Duration,
    pub cycle: CycleSteps,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Replace,
            submit_delay: Duration::from_millis(500),
            cycle: CycleSteps::default(),
        }
    }
}

// ─── Cycle tick report ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStep {
    Interrupt,
    Reconnect,
    Resume,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: CycleStep,
    /// 1-based repetition of this step within the tick.
    pub attempt: u32,
    pub error: Option<String>,
}

/// Outcome of one cycle tick, step by step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub steps: Vec<StepReport>,
    /// False when a stop cut the sequence short.
    pub completed: bool,
    /// Some step reported that the target session is gone.
    #[serde(skip)]
    pub target_missing: bool,
}

impl TickReport {
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| s.error.is_some()).count()
    }
}

// ─── Status snapshot ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatus {
    pub kind: TaskKind,
    pub name: String,
    /// Raw target session name.
    pub target: String,
    pub interval_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_delay_seconds: Option<f64>,
    pub state: TaskState,
    pub stop_reason: Option<StopReason>,
    pub created_at: DateTime<Utc>,
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<TickReport>,
}

impl TaskStatus {
    pub(crate) fn for_timer(name: &str, spec: &TimerSpec) -> Self {
        Self {
            kind: TaskKind::Timer,
            name: name.to_string(),
            target: spec.session_id.clone(),
            interval_seconds: spec.interval.as_secs_f64(),
            message: Some(spec.message.clone()),
            initial_delay_seconds: None,
            state: TaskState::Running,
            stop_reason: None,
            created_at: Utc::now(),
            ticks: 0,
            last_tick_at: None,
            last_error: None,
            last_cycle: None,
        }
    }

    pub(crate) fn for_cycle(name: &str, spec: &CycleSpec) -> Self {
        Self {
            kind: TaskKind::Cycle,
            name: name.to_string(),
            target: spec.session_id.clone(),
            interval_seconds: spec.interval.as_secs_f64(),
            message: None,
            initial_delay_seconds: Some(spec.initial_delay.as_secs_f64()),
            state: TaskState::Running,
            stop_reason: None,
            created_at: Utc::now(),
            ticks: 0,
            last_tick_at: None,
            last_error: None,
            last_cycle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }
}

// ─── Operation outcomes ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartOutcome {
    pub status: TaskStatus,
    /// A running task with the same name was cancelled first.
    pub replaced: bool,
    pub policy: DuplicatePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopOutcome {
    pub kind: TaskKind,
    pub name: String,
    /// False for unknown or already-stopped names (a no-op).
    pub was_running: bool,
    pub status: Option<TaskStatus>,
}
