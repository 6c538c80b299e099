//! Session snapshots annotated with their decoded channel.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::channel::{self, Channel, ChannelError};

/// Channel tag as decoded from a live session name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTag {
    Channel(Channel),
    /// More than one marker: the name is corrupted and belongs to no channel.
    Ambiguous,
}

impl SessionTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Channel(c) => c.as_str(),
            Self::Ambiguous => "AMBIGUOUS",
        }
    }

    pub fn channel(self) -> Option<Channel> {
        match self {
            Self::Channel(c) => Some(c),
            Self::Ambiguous => None,
        }
    }
}

impl Serialize for SessionTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One live session as seen at listing time. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Name exactly as tmux knows it, markers included.
    pub raw_id: String,
    /// Name with every marker removed.
    pub display_name: String,
    pub channel: SessionTag,
    pub windows: u32,
    pub attached: bool,
    /// Unix seconds, when tmux reported it.
    pub created: Option<i64>,
}

impl Session {
    /// Decode a raw session name. Ambiguous names still produce a session,
    /// tagged [`SessionTag::Ambiguous`].
    pub fn from_raw(raw_id: impl Into<String>) -> Self {
        let raw_id = raw_id.into();
        let (display_name, tag) = match channel::decode(&raw_id) {
            Ok(decoded) => (decoded.display_name, SessionTag::Channel(decoded.channel)),
            Err(ChannelError::AmbiguousTag { .. }) | Err(ChannelError::UnknownChannel(_)) => {
                (channel::strip_markers(&raw_id), SessionTag::Ambiguous)
            }
        };
        Self {
            raw_id,
            display_name,
            channel: tag,
            windows: 0,
            attached: false,
            created: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, windows: u32, attached: bool, created: Option<i64>) -> Self {
        self.windows = windows;
        self.attached = attached;
        self.created = created;
        self
    }

    pub fn is_ambiguous(&self) -> bool {
        self.channel == SessionTag::Ambiguous
    }
}

/// Sessions addressed by `channel`.
///
/// `Broadcast` as a query means "every session", whatever its own tag.
/// Every other channel is an exact match; ambiguous sessions never match.
pub fn find_in_channel(sessions: &[Session], channel: Channel) -> Vec<&Session> {
    sessions
        .iter()
        .filter(|s| channel == Channel::Broadcast || s.channel == SessionTag::Channel(channel))
        .collect()
}

/// Display names grouped by the channel each session carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelGroups {
    pub channels: BTreeMap<Channel, Vec<String>>,
    pub ambiguous: Vec<String>,
}

pub fn group_by_channel(sessions: &[Session]) -> ChannelGroups {
    let mut groups = ChannelGroups {
        channels: Channel::ALL.iter().map(|c| (*c, Vec::new())).collect(),
        ambiguous: Vec::new(),
    };
    for session in sessions {
        match session.channel {
            SessionTag::Channel(c) => groups
                .channels
                .entry(c)
                .or_default()
                .push(session.display_name.clone()),
            SessionTag::Ambiguous => groups.ambiguous.push(session.display_name.clone()),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::retag;

    fn sessions() -> Vec<Session> {
        vec![
            Session::from_raw(retag("agent1", Channel::A)),
            Session::from_raw(retag("agent2", Channel::A)),
            Session::from_raw(retag("agent3", Channel::B)),
            Session::from_raw(retag("loner", Channel::Isolated)),
            Session::from_raw("plain"),
            Session::from_raw("bad\u{200B}\u{200C}"),
        ]
    }

    fn names(found: &[&Session]) -> Vec<String> {
        found.iter().map(|s| s.display_name.clone()).collect()
    }

    #[test]
    fn from_raw_decodes_tag() {
        let s = Session::from_raw("agent1\u{200B}");
        assert_eq!(s.display_name, "agent1");
        assert_eq!(s.channel, SessionTag::Channel(Channel::A));
        assert!(!s.is_ambiguous());
    }

    #[test]
    fn from_raw_keeps_ambiguous_sessions() {
        let s = Session::from_raw("bad\u{200B}\u{200C}");
        assert!(s.is_ambiguous());
        assert_eq!(s.display_name, "bad");
        assert_eq!(s.raw_id, "bad\u{200B}\u{200C}");
        assert_eq!(s.channel.channel(), None);
    }

    #[test]
    fn find_exact_channel() {
        let all = sessions();
        assert_eq!(names(&find_in_channel(&all, Channel::A)), ["agent1", "agent2"]);
        assert_eq!(names(&find_in_channel(&all, Channel::B)), ["agent3"]);
        assert!(find_in_channel(&all, Channel::C).is_empty());
    }

    #[test]
    fn find_broadcast_returns_everything() {
        let all = sessions();
        assert_eq!(find_in_channel(&all, Channel::Broadcast).len(), all.len());
    }

    #[test]
    fn find_isolated_only_tagged_isolated() {
        let all = sessions();
        assert_eq!(names(&find_in_channel(&all, Channel::Isolated)), ["loner"]);
    }

    #[test]
    fn find_none_returns_untagged_but_not_ambiguous() {
        let all = sessions();
        assert_eq!(names(&find_in_channel(&all, Channel::None)), ["plain"]);
    }

    #[test]
    fn group_includes_every_channel_key() {
        let groups = group_by_channel(&sessions());
        assert_eq!(groups.channels.len(), Channel::ALL.len());
        assert_eq!(groups.channels[&Channel::A], ["agent1", "agent2"]);
        assert!(groups.channels[&Channel::E].is_empty());
        assert_eq!(groups.channels[&Channel::None], ["plain"]);
        assert_eq!(groups.ambiguous, ["bad"]);
    }

    #[test]
    fn session_serializes_tag_as_token() {
        let json = serde_json::to_value(Session::from_raw("bad\u{200B}\u{200C}")).expect("json");
        assert_eq!(json["channel"], "AMBIGUOUS");
        let json = serde_json::to_value(Session::from_raw("ok\u{200F}")).expect("json");
        assert_eq!(json["channel"], "ISOLATED");
        assert_eq!(json["display_name"], "ok");
    }
}
