//! Tool dispatch: argument validation, delegation, structured errors.
//!
//! Every tool returns either a JSON payload or a [`ToolError`] carrying a
//! machine-readable kind, the offending argument (when there is one) and the
//! tool name. Nothing here panics on caller input.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chanmux_core::{Channel, ChannelError, Session, retag, strip_markers};
use chanmux_tasks::{CycleSpec, TaskError, TaskKind, TaskStatus, TimerSpec};
use chanmux_tmux::{Key, TmuxError};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::context::AppContext;
use crate::directory::ResolveError;

pub const MAX_INTERRUPTS: u32 = 20;

/// Agents `launch_agent` knows how to start, and the command that starts each.
pub const AGENTS: &[(&str, &str)] = &[
    ("gemini", "gemini"),
    ("claude", "claude"),
    ("codex", "codex"),
    ("swarm", "swarmcode"),
];

// ─── Errors ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArguments,
    NoSuchSession,
    AmbiguousTag,
    DuplicateName,
    SpawnFailed,
    Timeout,
    TargetGone,
    CommandFailed,
    UnknownTool,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArguments => "invalid_arguments",
            Self::NoSuchSession => "no_such_session",
            Self::AmbiguousTag => "ambiguous_tag",
            Self::DuplicateName => "duplicate_name",
            Self::SpawnFailed => "spawn_failed",
            Self::Timeout => "timeout",
            Self::TargetGone => "target_gone",
            Self::CommandFailed => "command_failed",
            Self::UnknownTool => "unknown_tool",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,
    pub tool: String,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            argument: None,
            tool: String::new(),
        }
    }

    fn invalid(argument: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArguments, message).with_argument(argument)
    }

    #[must_use]
    pub fn with_argument(mut self, argument: &str) -> Self {
        self.argument = Some(argument.to_string());
        self
    }

    #[must_use]
    fn in_tool(mut self, tool: &str) -> Self {
        self.tool = tool.to_string();
        self
    }

    pub(crate) fn from_tmux(err: TmuxError, argument: Option<&str>) -> Self {
        let kind = match &err {
            TmuxError::NotFound(_) | TmuxError::Spawn(_) => ErrorKind::SpawnFailed,
            TmuxError::Timeout { .. } => ErrorKind::Timeout,
            TmuxError::NoSuchSession(_) => ErrorKind::NoSuchSession,
            TmuxError::CommandFailed { .. } | TmuxError::ParseError { .. } => {
                ErrorKind::CommandFailed
            }
        };
        let mut out = Self::new(kind, err.to_string());
        if let Some(arg) = argument {
            out = out.with_argument(arg);
        }
        out
    }

    fn from_resolve(err: ResolveError, argument: &str) -> Self {
        match err {
            ResolveError::NotFound(_) => {
                Self::new(ErrorKind::NoSuchSession, err.to_string()).with_argument(argument)
            }
            ResolveError::Ambiguous { .. } => Self::invalid(
                argument,
                format!("{err}; pass the exact session_id from list_sessions"),
            ),
            ResolveError::Tmux(e) => Self::from_tmux(e, Some(argument)),
        }
    }

    fn from_task(err: TaskError) -> Self {
        match err {
            TaskError::DuplicateName { .. } => {
                Self::new(ErrorKind::DuplicateName, err.to_string()).with_argument("name")
            }
            TaskError::InvalidInterval { .. } => Self::invalid("interval_seconds", err.to_string()),
        }
    }

    fn from_channel(err: ChannelError, argument: &str) -> Self {
        let kind = match err {
            ChannelError::UnknownChannel(_) => ErrorKind::InvalidArguments,
            ChannelError::AmbiguousTag { .. } => ErrorKind::AmbiguousTag,
        };
        Self::new(kind, err.to_string()).with_argument(argument)
    }
}

// ─── Argument access ─────────────────────────────────────────────

struct Args<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Args<'a> {
    fn from_value(value: &'a Value) -> Result<Self, ToolError> {
        match value {
            Value::Null => Ok(Self { map: None }),
            Value::Object(map) => Ok(Self { map: Some(map) }),
            _ => Err(ToolError::new(
                ErrorKind::InvalidArguments,
                "arguments must be a JSON object",
            )),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.and_then(|m| m.get(key)).filter(|v| !v.is_null())
    }

    fn opt_string(&self, key: &str) -> Result<Option<&'a str>, ToolError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => {
                Err(ToolError::invalid(key, format!("{key} must not be empty")))
            }
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ToolError::invalid(key, format!("{key} must be a string"))),
        }
    }

    fn string(&self, key: &str) -> Result<&'a str, ToolError> {
        self.opt_string(key)?
            .ok_or_else(|| ToolError::invalid(key, format!("missing required argument {key}")))
    }

    fn opt_seconds(&self, key: &str, allow_zero: bool) -> Result<Option<Duration>, ToolError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let secs = value
            .as_f64()
            .ok_or_else(|| ToolError::invalid(key, format!("{key} must be a number of seconds")))?;
        let in_range = if allow_zero { secs >= 0.0 } else { secs > 0.0 };
        if !secs.is_finite() || !in_range {
            let bound = if allow_zero { "non-negative" } else { "positive" };
            return Err(ToolError::invalid(key, format!("{key} must be {bound} and finite, got {secs}")));
        }
        Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(|_| ToolError::invalid(key, format!("{key} is out of range")))
    }

    fn seconds(&self, key: &str) -> Result<Duration, ToolError> {
        self.opt_seconds(key, false)?
            .ok_or_else(|| ToolError::invalid(key, format!("missing required argument {key}")))
    }

    fn opt_count(&self, key: &str, max: u32) -> Result<Option<u32>, ToolError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value.as_u64() {
            Some(n) if (1..=u64::from(max)).contains(&n) => Ok(u32::try_from(n).ok()),
            _ => Err(ToolError::invalid(
                key,
                format!("{key} must be an integer between 1 and {max}"),
            )),
        }
    }

    fn channel(&self, key: &str) -> Result<Channel, ToolError> {
        self.string(key)?
            .parse()
            .map_err(|e| ToolError::from_channel(e, key))
    }
}

/// New session names end up as tmux targets, where `:` and `.` are
/// window/pane separators.
fn validate_session_name(key: &str, name: &str) -> Result<(), ToolError> {
    if let Some(bad) = name.chars().find(|c| matches!(c, ':' | '.') || c.is_control()) {
        return Err(ToolError::invalid(
            key,
            format!("{key} must not contain {bad:?}"),
        ));
    }
    if strip_markers(name).trim().is_empty() {
        return Err(ToolError::invalid(key, format!("{key} must not be empty")));
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ─── Dispatch ────────────────────────────────────────────────────

/// Run `tool` with `arguments` (a JSON object, or null for none).
pub async fn call_tool(ctx: &AppContext, tool: &str, arguments: &Value) -> Result<Value, ToolError> {
    tracing::debug!(tool, "tool call");
    let result = match Args::from_value(arguments) {
        Ok(args) => dispatch(ctx, tool, &args).await,
        Err(e) => Err(e),
    };
    result.map_err(|e| {
        tracing::warn!(tool, kind = %e.kind, argument = ?e.argument, "tool failed: {}", e.message);
        e.in_tool(tool)
    })
}

async fn dispatch(ctx: &AppContext, tool: &str, args: &Args<'_>) -> Result<Value, ToolError> {
    match tool {
        "list_sessions" => list_sessions(ctx).await,
        "send_message" => send_message(ctx, args).await,
        "start_timer" => start_timer(ctx, args).await,
        "stop_timer" => stop_task(ctx, TaskKind::Timer, args).await,
        "start_cycle" => start_cycle(ctx, args).await,
        "stop_cycle" => stop_task(ctx, TaskKind::Cycle, args).await,
        "send_interrupt" => send_interrupt(ctx, args).await,
        "create_agent_session" => create_agent_session(ctx, args).await,
        "find_agents_in_channel" => find_agents_in_channel(ctx, args).await,
        "broadcast_to_channel" => broadcast_to_channel(ctx, args).await,
        "change_agent_channel" => change_agent_channel(ctx, args).await,
        "launch_agent" => launch_agent(ctx, args).await,
        "task_status" => task_status(ctx, args).await,
        _ => Err(ToolError::new(
            ErrorKind::UnknownTool,
            format!("unknown tool {tool:?}"),
        )),
    }
}

async fn resolve(ctx: &AppContext, key: &str, id_or_name: &str) -> Result<Session, ToolError> {
    ctx.directory
        .resolve(id_or_name)
        .await
        .map_err(|e| ToolError::from_resolve(e, key))
}

// ─── Sessions and messages ───────────────────────────────────────

async fn list_sessions(ctx: &AppContext) -> Result<Value, ToolError> {
    let sessions = ctx
        .directory
        .list()
        .await
        .map_err(|e| ToolError::from_tmux(e, None))?;
    Ok(json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}

async fn send_message(ctx: &AppContext, args: &Args<'_>) -> Result<Value, ToolError> {
    let session = resolve(ctx, "session_id", args.string("session_id")?).await?;
    let message = args.string("message")?;
    ctx.mux
        .send_message(&session.raw_id, message, ctx.submit_delay())
        .await
        .map_err(|e| ToolError::from_tmux(e, Some("session_id")))?;
    tracing::info!(session = %session.display_name, "message sent");
    Ok(json!({
        "sent": true,
        "session": session.display_name,
        "session_id": session.raw_id,
        "message": message,
    }))
}

async fn send_interrupt(ctx: &AppContext, args: &Args<'_>) -> Result<Value, ToolError> {
    let session = resolve(ctx, "session_id", args.string("session_id")?).await?;
    let count = args.opt_count("count", MAX_INTERRUPTS)?.unwrap_or(1);
    let spacing = ctx.registry.config().cycle.interrupt_spacing;
    for i in 0..count {
        if i > 0 {
            tokio::time::sleep(spacing).await;
        }
        ctx.mux
            .send_key(&session.raw_id, Key::Interrupt)
            .await
            .map_err(|e| ToolError::from_tmux(e, Some("session_id")))?;
    }
    Ok(json!({
        "session": session.display_name,
        "session_id": session.raw_id,
        "interrupts_sent": count,
    }))
}

// ─── Timers and cycles ───────────────────────────────────────────

async fn start_timer(ctx: &AppContext, args: &Args<'_>) -> Result<Value, ToolError> {
    let name = args.string("name")?;
    let message = args.string("message")?;
    let interval = args.seconds("interval_seconds")?;
    let session = resolve(ctx, "session_id", args.string("session_id")?).await?;
    let spec = TimerSpec {
        session_id: session.raw_id,
        message: message.to_string(),
        interval,
    };
    let outcome = ctx
        .registry
        .start_timer(name, spec)
        .await
        .map_err(ToolError::from_task)?;
    Ok(to_json(&outcome))
}

async fn start_cycle(ctx: &AppContext, args: &Args<'_>) -> Result<Value, ToolError> {
    let name = args.string("name")?;
    let interval = args.seconds("interval_seconds")?;
    let initial_delay = args
        .opt_seconds("initial_delay_seconds", true)?
        .unwrap_or(Duration::ZERO);
    let session = resolve(ctx, "session_id", args.string("session_id")?).await?;
    let spec = CycleSpec {
        session_id: session.raw_id,
        interval,
        initial_delay,
    };
    let outcome = ctx
        .registry
        .start_cycle(name, spec)
        .await
        .map_err(ToolError::from_task)?;
    Ok(to_json(&outcome))
}

async fn stop_task(ctx: &AppContext, kind: TaskKind, args: &Args<'_>) -> Result<Value, ToolError> {
    let name = args.string("name")?;
    let outcome = ctx.registry.stop(kind, name).await;
    Ok(to_json(&outcome))
}

async fn task_status(ctx: &AppContext, args: &Args<'_>) -> Result<Value, ToolError> {
    let kinds: &[TaskKind] = match args.opt_string("kind")? {
        None => &[TaskKind::Timer, TaskKind::Cycle],
        Some(k) if k.eq_ignore_ascii_case("timer") => &[TaskKind::Timer],
        Some(k) if k.eq_ignore_ascii_case("cycle") => &[TaskKind::Cycle],
        Some(k) => {
            return Err(ToolError::invalid(
                "kind",
                format!("kind must be \"timer\" or \"cycle\", got {k:?}"),
            ));
        }
    };
    let name = args.opt_string("name")?;

    let mut out = Map::new();
    for kind in kinds {
        let statuses: Vec<TaskStatus> = match name {
            Some(n) => ctx.registry.status(*kind, n).await.into_iter().collect(),
            None => ctx.registry.status_all(*kind).await,
        };
        let key = match kind {
            TaskKind::Timer => "timers",
            TaskKind::Cycle => "cycles",
        };
        out.insert(key.to_string(), to_json(&statuses));
    }
    Ok(Value::Object(out))
}

// ─── Channels ────────────────────────────────────────────────────

async fn create_agent_session(ctx: &AppContext, args: &Args<'_>) -> Result<Value, ToolError> {
    let name = args.string("name")?;
    validate_session_name("name", name)?;
    let channel = args.channel("channel")?;
    let display_name = strip_markers(name);

    let existing = ctx
        .directory
        .list()
        .await
        .map_err(|e| ToolError::from_tmux(e, None))?;
    if let Some(clash) = existing.iter().find(|s| s.display_name == display_name) {
        return Err(ToolError::invalid(
            "name",
            format!(
                "a session named {display_name:?} already exists on channel {}",
                clash.channel.as_str()
            ),
        ));
    }

    let raw_id = retag(&display_name, channel);
    ctx.mux
        .create_session(&raw_id)
        .await
        .map_err(|e| ToolError::from_tmux(e, Some("name")))?;
    tracing::info!(session = %display_name, channel = %channel, "created agent session");
    Ok(json!({
        "name": display_name,
        "session_id": raw_id,
        "channel": channel,
        "channel_description": channel.description(),
    }))
}

async fn find_agents_in_channel(ctx: &AppContext, args: &Args<'_>) -> Result<Value, ToolError> {
    let channel = args.channel("channel")?;
    let agents = ctx
        .directory
        .find_in_channel(channel)
        .await
        .map_err(|e| ToolError::from_tmux(e, None))?;
    Ok(json!({
        "channel": channel,
        "count": agents.len(),
        "agents": agents,
    }))
}

#[derive(Debug, Serialize)]
struct Delivery {
    session: String,
    session_id: String,
    delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ToolError>,
}

async fn broadcast_to_channel(ctx: &AppContext, args: &Args<'_>) -> Result<Value, ToolError> {
    let channel = args.channel("channel")?;
    let message = args.string("message")?;
    let recipients = ctx
        .directory
        .find_in_channel(channel)
        .await
        .map_err(|e| ToolError::from_tmux(e, None))?;

    // One task per recipient: a slow session does not hold up the rest.
    let submit_delay = ctx.submit_delay();
    let handles: Vec<_> = recipients
        .iter()
        .map(|session| {
            let mux = Arc::clone(&ctx.mux);
            let raw_id = session.raw_id.clone();
            let message = message.to_string();
            tokio::spawn(async move { mux.send_message(&raw_id, &message, submit_delay).await })
        })
        .collect();

    let mut deliveries = Vec::with_capacity(recipients.len());
    for (session, handle) in recipients.into_iter().zip(handles) {
        let error = match handle.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(ToolError::from_tmux(e, None)),
            Err(e) => Some(ToolError::new(ErrorKind::CommandFailed, e.to_string())),
        };
        deliveries.push(Delivery {
            session: session.display_name,
            session_id: session.raw_id,
            delivered: error.is_none(),
            error,
        });
    }

    let delivered = deliveries.iter().filter(|d| d.delivered).count();
    let failed = deliveries.len() - delivered;
    tracing::info!(channel = %channel, delivered, failed, "broadcast complete");
    Ok(json!({
        "channel": channel,
        "message": message,
        "recipients": deliveries.len(),
        "successful_sends": delivered,
        "failed_sends": failed,
        "deliveries": deliveries,
    }))
}

/// Retag `session` onto `channel` via a rename. Returns the new raw id.
async fn move_to_channel(
    ctx: &AppContext,
    key: &str,
    session: &Session,
    channel: Channel,
) -> Result<String, ToolError> {
    let new_raw = retag(&session.raw_id, channel);
    if new_raw != session.raw_id {
        ctx.mux
            .rename_session(&session.raw_id, &new_raw)
            .await
            .map_err(|e| ToolError::from_tmux(e, Some(key)))?;
        tracing::info!(
            session = %session.display_name,
            from = session.channel.as_str(),
            to = %channel,
            "changed agent channel"
        );
    }
    Ok(new_raw)
}

/// Running tasks aimed at `raw_id`, as `kind:name`.
async fn tasks_targeting(ctx: &AppContext, raw_id: &str) -> Vec<String> {
    let mut names = Vec::new();
    for kind in [TaskKind::Timer, TaskKind::Cycle] {
        for status in ctx.registry.status_all(kind).await {
            if status.is_running() && status.target == raw_id {
                names.push(format!("{}:{}", status.kind, status.name));
            }
        }
    }
    names
}

async fn change_agent_channel(ctx: &AppContext, args: &Args<'_>) -> Result<Value, ToolError> {
    let session = resolve(ctx, "name", args.string("name")?).await?;
    let channel = args.channel("new_channel")?;
    let affected = tasks_targeting(ctx, &session.raw_id).await;
    let new_raw = move_to_channel(ctx, "name", &session, channel).await?;
    let changed = new_raw != session.raw_id;
    // Their stored target no longer exists; each ends with target_gone on its next tick.
    let orphaned = if changed { affected } else { Vec::new() };
    Ok(json!({
        "name": session.display_name,
        "changed": changed,
        "old_session_id": session.raw_id,
        "new_session_id": new_raw,
        "old_channel": session.channel,
        "new_channel": channel,
        "channel_description": channel.description(),
        "orphaned_tasks": orphaned,
    }))
}

async fn launch_agent(ctx: &AppContext, args: &Args<'_>) -> Result<Value, ToolError> {
    let agent = args.string("agent")?;
    let Some((agent, command)) = AGENTS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(agent.trim()))
    else {
        let known: Vec<&str> = AGENTS.iter().map(|(name, _)| *name).collect();
        return Err(ToolError::invalid(
            "agent",
            format!("unknown agent {agent:?} (expected one of {})", known.join(", ")),
        ));
    };
    let channel = match args.opt_string("channel")? {
        Some(token) => Some(
            token
                .parse::<Channel>()
                .map_err(|e| ToolError::from_channel(e, "channel"))?,
        ),
        None => None,
    };
    let session = resolve(ctx, "session_id", args.string("session_id")?).await?;

    let raw_id = match channel {
        Some(channel) => move_to_channel(ctx, "session_id", &session, channel).await?,
        None => session.raw_id.clone(),
    };
    ctx.mux
        .send_message(&raw_id, command, ctx.submit_delay())
        .await
        .map_err(|e| ToolError::from_tmux(e, Some("session_id")))?;
    tracing::info!(agent, session = %session.display_name, "launched agent");
    Ok(json!({
        "agent": agent,
        "command": command,
        "session": session.display_name,
        "session_id": raw_id,
        "channel": channel,
    }))
}
