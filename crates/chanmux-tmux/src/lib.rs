//! chanmux-tmux: tmux IO boundary.
//! Subprocess execution with a bounded timeout, session listing, and the
//! `Multiplexer` adapter the rest of the workspace talks to. No channel or
//! scheduling logic lives here.

pub mod error;
pub mod executor;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod multiplexer;
pub mod session_info;

pub use error::TmuxError;
pub use executor::{DEFAULT_COMMAND_TIMEOUT, TmuxCommandRunner, TmuxExecutor};
pub use multiplexer::{Key, Multiplexer, TmuxMultiplexer};
pub use session_info::{LIST_SESSIONS_FORMAT, TmuxSessionInfo, parse_list_sessions_output};
