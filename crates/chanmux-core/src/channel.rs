//! Agent channel tags carried invisibly inside tmux session names.
//!
//! Each tagged channel owns exactly one zero-width code point. A session name
//! carries at most one of them, appended after the visible part:
//!
//! ```text
//! "agent1" + U+200B  -> display "agent1", channel A
//! "agent1"           -> display "agent1", channel NONE
//! "ag\u{200B}ent\u{200C}" -> ambiguous (two markers)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ─── Marker code points ──────────────────────────────────────────

/// Zero width space.
pub const MARKER_A: char = '\u{200B}';
/// Zero width non-joiner.
pub const MARKER_B: char = '\u{200C}';
/// Zero width joiner.
pub const MARKER_C: char = '\u{200D}';
/// Word joiner.
pub const MARKER_D: char = '\u{2060}';
/// Zero width no-break space.
pub const MARKER_E: char = '\u{FEFF}';
/// Left-to-right mark.
pub const MARKER_BROADCAST: char = '\u{200E}';
/// Right-to-left mark.
pub const MARKER_ISOLATED: char = '\u{200F}';

// ─── Channel ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    A,
    B,
    C,
    D,
    E,
    Broadcast,
    Isolated,
    /// Untagged: no marker present.
    None,
}

impl Channel {
    pub const ALL: [Self; 8] = [
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::Broadcast,
        Self::Isolated,
        Self::None,
    ];

    /// Channels that own a marker (everything except `None`).
    pub const TAGGED: [Self; 7] = [
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::Broadcast,
        Self::Isolated,
    ];

    pub fn marker(self) -> Option<char> {
        match self {
            Self::A => Some(MARKER_A),
            Self::B => Some(MARKER_B),
            Self::C => Some(MARKER_C),
            Self::D => Some(MARKER_D),
            Self::E => Some(MARKER_E),
            Self::Broadcast => Some(MARKER_BROADCAST),
            Self::Isolated => Some(MARKER_ISOLATED),
            Self::None => None,
        }
    }

    /// Reverse of [`Channel::marker`]. Returns `None` for ordinary characters.
    pub fn from_marker(c: char) -> Option<Self> {
        match c {
            MARKER_A => Some(Self::A),
            MARKER_B => Some(Self::B),
            MARKER_C => Some(Self::C),
            MARKER_D => Some(Self::D),
            MARKER_E => Some(Self::E),
            MARKER_BROADCAST => Some(Self::Broadcast),
            MARKER_ISOLATED => Some(Self::Isolated),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::Broadcast => "BROADCAST",
            Self::Isolated => "ISOLATED",
            Self::None => "NONE",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::A => "Primary communication channel",
            Self::B => "Secondary communication channel",
            Self::C => "Tertiary communication channel",
            Self::D => "Quaternary communication channel",
            Self::E => "Emergency/Priority channel",
            Self::Broadcast => "Broadcast to all agents",
            Self::Isolated => "Isolated - no inter-agent communication",
            Self::None => "Untagged session",
        }
    }

    /// Comma-separated list of accepted tokens, for error messages.
    pub fn token_list() -> String {
        Self::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            "E" => Ok(Self::E),
            "BROADCAST" => Ok(Self::Broadcast),
            "ISOLATED" => Ok(Self::Isolated),
            "NONE" => Ok(Self::None),
            _ => Err(ChannelError::UnknownChannel(s.to_string())),
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("unknown channel {0:?} (expected one of {list})", list = Channel::token_list())]
    UnknownChannel(String),

    #[error("session name {identifier:?} carries {markers} channel markers")]
    AmbiguousTag { identifier: String, markers: usize },
}

// ─── Codec ───────────────────────────────────────────────────────

/// Decoded form of a raw session identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub display_name: String,
    pub channel: Channel,
}

/// Marker for `channel` as a string; empty for [`Channel::None`].
pub fn encode(channel: Channel) -> String {
    channel.marker().map(String::from).unwrap_or_default()
}

/// Split a raw identifier into its display name and channel.
///
/// Fails with [`ChannelError::AmbiguousTag`] when more than one marker is
/// present; callers must surface that instead of picking one.
pub fn decode(identifier: &str) -> Result<Decoded, ChannelError> {
    let mut found: Option<Channel> = None;
    let mut markers = 0usize;
    let mut display_name = String::with_capacity(identifier.len());

    for c in identifier.chars() {
        match Channel::from_marker(c) {
            Some(channel) => {
                markers += 1;
                found = Some(channel);
            }
            None => display_name.push(c),
        }
    }

    if markers > 1 {
        return Err(ChannelError::AmbiguousTag {
            identifier: identifier.to_string(),
            markers,
        });
    }

    Ok(Decoded {
        display_name,
        channel: found.unwrap_or(Channel::None),
    })
}

/// Remove every marker, ignoring ambiguity.
pub fn strip_markers(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| Channel::from_marker(*c).is_none())
        .collect()
}

/// Replace whatever tag `identifier` carries with `channel`.
/// Destructive: an ambiguous identifier is silently repaired.
pub fn retag(identifier: &str, channel: Channel) -> String {
    let mut out = strip_markers(identifier);
    if let Some(marker) = channel.marker() {
        out.push(marker);
    }
    out
}
