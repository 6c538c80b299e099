//! Read-only resources: snapshots of sessions, tasks and channel membership.
//!
//! Reads only ever list sessions; they never touch the task registry's state
//! beyond a snapshot and never send anything to tmux.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};

use chanmux_tasks::TaskKind;

use crate::context::AppContext;
use crate::dispatch::ToolError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

pub const SESSIONS_URI: &str = "tmux://sessions";
pub const TIMERS_URI: &str = "tmux://timers";
pub const CYCLES_URI: &str = "tmux://cycles";
pub const AGENT_CHANNELS_URI: &str = "tmux://agent-channels";

pub fn resource_definitions() -> Vec<ResourceDefinition> {
    vec![
        ResourceDefinition {
            uri: SESSIONS_URI,
            name: "sessions",
            description: "Live tmux sessions with decoded channels",
            mime_type: "application/json",
        },
        ResourceDefinition {
            uri: TIMERS_URI,
            name: "timers",
            description: "Message timers and their state",
            mime_type: "application/json",
        },
        ResourceDefinition {
            uri: CYCLES_URI,
            name: "cycles",
            description: "Auto-cycles and their last sequence",
            mime_type: "application/json",
        },
        ResourceDefinition {
            uri: AGENT_CHANNELS_URI,
            name: "agent-channels",
            description: "Agent display names grouped by channel",
            mime_type: "application/json",
        },
    ]
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("unknown resource {0:?}")]
    Unknown(String),

    #[error(transparent)]
    Tmux(ToolError),
}

pub async fn read_resource(ctx: &AppContext, uri: &str) -> Result<Value, ResourceError> {
    let timestamp = Utc::now();
    let payload = match uri {
        SESSIONS_URI => {
            let sessions = ctx.directory.list().await.map_err(tmux_error)?;
            json!({ "timestamp": timestamp, "count": sessions.len(), "sessions": sessions })
        }
        TIMERS_URI => tasks_payload(ctx, TaskKind::Timer, "timers").await,
        CYCLES_URI => {
            let mut payload = tasks_payload(ctx, TaskKind::Cycle, "cycles").await;
            let steps = &ctx.registry.config().cycle;
            payload["sequence"] = json!({
                "interrupts": steps.interrupt_count,
                "interrupt_spacing_seconds": steps.interrupt_spacing.as_secs_f64(),
                "pause_before_reconnect_seconds": steps.pause_before_reconnect.as_secs_f64(),
                "reconnect_command": steps.reconnect_command,
                "pause_before_resume_seconds": steps.pause_before_resume.as_secs_f64(),
                "resume_command": steps.resume_command,
            });
            payload
        }
        AGENT_CHANNELS_URI => {
            let groups = ctx.directory.group_by_channel().await.map_err(tmux_error)?;
            let descriptions: serde_json::Map<String, Value> = groups
                .channels
                .keys()
                .map(|c| (c.as_str().to_string(), json!(c.description())))
                .collect();
            json!({
                "timestamp": timestamp,
                "channels": groups.channels,
                "ambiguous": groups.ambiguous,
                "descriptions": descriptions,
            })
        }
        _ => return Err(ResourceError::Unknown(uri.to_string())),
    };
    Ok(payload)
}

fn tmux_error(err: chanmux_tmux::TmuxError) -> ResourceError {
    ResourceError::Tmux(ToolError::from_tmux(err, None))
}

async fn tasks_payload(ctx: &AppContext, kind: TaskKind, key: &str) -> Value {
    let statuses = ctx.registry.status_all(kind).await;
    let running = statuses.iter().filter(|s| s.is_running()).count();
    let mut payload = json!({
        "timestamp": Utc::now(),
        "running": running,
    });
    payload[key] = serde_json::to_value(&statuses).unwrap_or(Value::Null);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanmux_core::{Channel, retag};
    use chanmux_tasks::{RegistryConfig, TimerSpec};
    use chanmux_tmux::Multiplexer;
    use chanmux_tmux::fake::FakeMultiplexer;
    use std::sync::Arc;
    use std::time::Duration;

    fn context(sessions: &[String]) -> (Arc<FakeMultiplexer>, AppContext) {
        let fake = Arc::new(FakeMultiplexer::with_sessions(sessions.iter().cloned()));
        let config = RegistryConfig {
            submit_delay: Duration::ZERO,
            ..RegistryConfig::default()
        };
        let ctx = AppContext::new(Arc::clone(&fake) as Arc<dyn Multiplexer>, config);
        (fake, ctx)
    }

    #[tokio::test]
    async fn reads_never_send_anything() {
        let (fake, ctx) = context(&[retag("agent1", Channel::A), "plain".to_string()]);
        for def in resource_definitions() {
            read_resource(&ctx, def.uri).await.expect(def.uri);
        }
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn sessions_payload_carries_channels() {
        let (_, ctx) = context(&[retag("agent1", Channel::A)]);
        let payload = read_resource(&ctx, SESSIONS_URI).await.expect("read");
        assert_eq!(payload["count"], 1);
        assert_eq!(payload["sessions"][0]["display_name"], "agent1");
        assert_eq!(payload["sessions"][0]["channel"], "A");
        assert!(payload["timestamp"].is_string());
    }

    #[tokio::test]
    async fn agent_channels_groups_membership() {
        let (_, ctx) = context(&[
            retag("agent1", Channel::A),
            retag("agent3", Channel::B),
            "x\u{200B}\u{200E}".to_string(),
        ]);
        let payload = read_resource(&ctx, AGENT_CHANNELS_URI).await.expect("read");
        assert_eq!(payload["channels"]["A"], json!(["agent1"]));
        assert_eq!(payload["channels"]["B"], json!(["agent3"]));
        assert_eq!(payload["channels"]["E"], json!([]));
        assert_eq!(payload["ambiguous"], json!(["x"]));
        assert_eq!(payload["descriptions"]["A"], Channel::A.description());
    }

    #[tokio::test]
    async fn timers_payload_lists_tasks() {
        let (_, ctx) = context(&["s".to_string()]);
        ctx.registry
            .start_timer(
                "t1",
                TimerSpec {
                    session_id: "s".to_string(),
                    message: "m".to_string(),
                    interval: Duration::from_secs(60),
                },
            )
            .await
            .expect("start");
        let payload = read_resource(&ctx, TIMERS_URI).await.expect("read");
        assert_eq!(payload["running"], 1);
        assert_eq!(payload["timers"][0]["name"], "t1");
        assert_eq!(payload["timers"][0]["target"], "s");

        let cycles = read_resource(&ctx, CYCLES_URI).await.expect("read");
        assert_eq!(cycles["running"], 0);
        assert_eq!(cycles["sequence"]["interrupts"], 5);
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_uri() {
        let (_, ctx) = context(&[]);
        assert!(matches!(
            read_resource(&ctx, "tmux://nope").await,
            Err(ResourceError::Unknown(_))
        ));
    }
}
