//! Error types for the task registry.

use thiserror::Error;

use crate::types::TaskKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("a {kind} named {name:?} is already running")]
    DuplicateName { kind: TaskKind, name: String },

    #[error("{kind} interval must be a positive duration")]
    InvalidInterval { kind: TaskKind },
}
