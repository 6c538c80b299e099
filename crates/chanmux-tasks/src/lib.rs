//! chanmux-tasks: named repeating timers and auto-cycles.
//!
//! One tokio task per running timer/cycle. The registry owns every entry,
//! guarantees at most one running task per (kind, name), and never returns
//! from `stop` until the task's run loop has exited.

mod cycle;
pub mod error;
pub mod registry;
mod timer;
pub mod types;

pub use error::TaskError;
pub use registry::TaskRegistry;
pub use types::{
    CycleSpec, CycleStep, CycleSteps, DuplicatePolicy, RegistryConfig, StartOutcome, StepReport,
    StopOutcome, StopReason, TaskKind, TaskState, TaskStatus, TickReport, TimerSpec,
};
