//! Session directory: live tmux sessions annotated with their channels.
//!
//! Every read re-queries tmux through `list_sessions`; nothing is cached.

use std::sync::Arc;

use chanmux_core::{Channel, ChannelGroups, Session, find_in_channel, group_by_channel};
use chanmux_tmux::{Multiplexer, TmuxError};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no session named {0:?}")]
    NotFound(String),

    #[error("{query:?} matches {} sessions on different channels", .matches.len())]
    Ambiguous { query: String, matches: Vec<String> },

    #[error(transparent)]
    Tmux(#[from] TmuxError),
}

#[derive(Clone)]
pub struct SessionDirectory {
    mux: Arc<dyn Multiplexer>,
}

impl SessionDirectory {
    pub fn new(mux: Arc<dyn Multiplexer>) -> Self {
        Self { mux }
    }

    pub async fn list(&self) -> Result<Vec<Session>, TmuxError> {
        let infos = self.mux.list_sessions().await?;
        Ok(infos
            .into_iter()
            .map(|info| {
                Session::from_raw(info.name).with_details(info.windows, info.attached, info.created)
            })
            .collect())
    }

    pub async fn find_in_channel(&self, channel: Channel) -> Result<Vec<Session>, TmuxError> {
        let sessions = self.list().await?;
        Ok(find_in_channel(&sessions, channel)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn group_by_channel(&self) -> Result<ChannelGroups, TmuxError> {
        Ok(group_by_channel(&self.list().await?))
    }

    /// Find the live session a caller means by `id_or_name`.
    ///
    /// An exact raw name wins. Otherwise the display name (markers stripped)
    /// must match exactly one session.
    pub async fn resolve(&self, id_or_name: &str) -> Result<Session, ResolveError> {
        let sessions = self.list().await?;
        resolve_in(sessions, id_or_name)
    }
}

pub(crate) fn resolve_in(sessions: Vec<Session>, id_or_name: &str) -> Result<Session, ResolveError> {
    if let Some(exact) = sessions.iter().find(|s| s.raw_id == id_or_name) {
        return Ok(exact.clone());
    }
    let wanted = chanmux_core::strip_markers(id_or_name);
    let mut matches: Vec<Session> = sessions
        .into_iter()
        .filter(|s| s.display_name == wanted)
        .collect();
    match matches.len() {
        0 => Err(ResolveError::NotFound(id_or_name.to_string())),
        1 => Ok(matches.remove(0)),
        _ => Err(ResolveError::Ambiguous {
            query: id_or_name.to_string(),
            matches: matches.into_iter().map(|s| s.raw_id).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanmux_core::{SessionTag, retag};
    use chanmux_tmux::fake::FakeMultiplexer;

    fn directory(names: &[String]) -> (Arc<FakeMultiplexer>, SessionDirectory) {
        let fake = Arc::new(FakeMultiplexer::with_sessions(names.iter().cloned()));
        let dir = SessionDirectory::new(Arc::clone(&fake) as Arc<dyn Multiplexer>);
        (fake, dir)
    }

    #[tokio::test]
    async fn list_decodes_every_session() {
        let (_, dir) = directory(&[
            retag("agent1", Channel::A),
            "plain".to_string(),
            "bad\u{200B}\u{200C}".to_string(),
        ]);
        let sessions = dir.list().await.expect("list");
        assert_eq!(sessions.len(), 3);
        assert_eq!(sessions[0].display_name, "agent1");
        assert_eq!(sessions[0].channel, SessionTag::Channel(Channel::A));
        assert_eq!(sessions[1].channel, SessionTag::Channel(Channel::None));
        assert_eq!(sessions[2].channel, SessionTag::Ambiguous);
        assert_eq!(sessions[2].display_name, "bad");
    }

    #[tokio::test]
    async fn list_reflects_live_state() {
        let (fake, dir) = directory(&["one".to_string()]);
        assert_eq!(dir.list().await.expect("list").len(), 1);
        fake.add_session("two");
        assert_eq!(dir.list().await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn broadcast_query_returns_everything() {
        let (_, dir) = directory(&[
            retag("agent1", Channel::A),
            retag("loner", Channel::Isolated),
            "plain".to_string(),
            "bad\u{200B}\u{200C}".to_string(),
        ]);
        assert_eq!(dir.find_in_channel(Channel::Broadcast).await.expect("find").len(), 4);
        let isolated = dir.find_in_channel(Channel::Isolated).await.expect("find");
        assert_eq!(isolated.len(), 1);
        assert_eq!(isolated[0].display_name, "loner");
    }

    #[tokio::test]
    async fn resolve_prefers_exact_raw_name() {
        let (_, dir) = directory(&["agent1".to_string(), retag("agent1", Channel::A)]);
        let exact = dir.resolve("agent1").await.expect("resolve");
        assert_eq!(exact.raw_id, "agent1");
        let tagged = dir.resolve(&retag("agent1", Channel::A)).await.expect("resolve");
        assert_eq!(tagged.channel, SessionTag::Channel(Channel::A));
    }

    #[tokio::test]
    async fn resolve_by_display_name() {
        let (_, dir) = directory(&[retag("agent2", Channel::B)]);
        let found = dir.resolve("agent2").await.expect("resolve");
        assert_eq!(found.raw_id, retag("agent2", Channel::B));
    }

    #[tokio::test]
    async fn resolve_reports_missing_and_ambiguous() {
        let (_, dir) = directory(&[retag("dup", Channel::A), retag("dup", Channel::B)]);
        assert!(matches!(
            dir.resolve("ghost").await,
            Err(ResolveError::NotFound(_))
        ));
        match dir.resolve("dup").await {
            Err(ResolveError::Ambiguous { matches, .. }) => assert_eq!(matches.len(), 2),
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn groups_cover_every_channel() {
        let (_, dir) = directory(&[
            retag("agent1", Channel::A),
            retag("agent3", Channel::B),
            "bad\u{200B}\u{200C}".to_string(),
        ]);
        let groups = dir.group_by_channel().await.expect("groups");
        assert_eq!(groups.channels.len(), Channel::ALL.len());
        assert_eq!(groups.channels[&Channel::A], ["agent1"]);
        assert!(groups.channels[&Channel::C].is_empty());
        assert_eq!(groups.ambiguous, ["bad"]);
    }
}
