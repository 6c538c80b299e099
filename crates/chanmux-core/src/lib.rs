//! chanmux-core: channel tags and session naming.
//! Pure functions and value types shared by the tmux boundary, the task
//! registry and the runtime. No IO.

pub mod channel;
pub mod session;

pub use channel::{Channel, ChannelError, decode, encode, retag, strip_markers};
pub use session::{ChannelGroups, Session, SessionTag, find_in_channel, group_by_channel};
