//! Tool definitions advertised by `tools/list`.

use serde::Serialize;
use serde_json::{Value, json};

use chanmux_core::Channel;

use crate::dispatch::{AGENTS, MAX_INTERRUPTS};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn channel_prop(description: &str) -> Value {
    let tokens: Vec<&str> = Channel::ALL.iter().map(|c| c.as_str()).collect();
    json!({
        "type": "string",
        "description": description,
        "enum": tokens,
    })
}

fn string_prop(description: &str) -> Value {
    json!({ "type": "string", "minLength": 1, "description": description })
}

fn seconds_prop(description: &str, exclusive_minimum: bool) -> Value {
    if exclusive_minimum {
        json!({ "type": "number", "exclusiveMinimum": 0, "description": description })
    } else {
        json!({ "type": "number", "minimum": 0, "description": description })
    }
}

const SESSION_ID: &str = "Session name as listed by list_sessions, or its display name";

pub fn tool_definitions() -> Vec<ToolDefinition> {
    let agents: Vec<&str> = AGENTS.iter().map(|(name, _)| *name).collect();
    vec![
        ToolDefinition {
            name: "list_sessions",
            description: "List live tmux sessions with their decoded agent channels",
            input_schema: schema(json!({}), &[]),
        },
        ToolDefinition {
            name: "send_message",
            description: "Type a message into a session and press Enter",
            input_schema: schema(
                json!({
                    "session_id": string_prop(SESSION_ID),
                    "message": string_prop("Text to send"),
                }),
                &["session_id", "message"],
            ),
        },
        ToolDefinition {
            name: "start_timer",
            description: "Send a message to a session every interval; replaces a running timer of the same name",
            input_schema: schema(
                json!({
                    "name": string_prop("Timer name"),
                    "session_id": string_prop(SESSION_ID),
                    "message": string_prop("Text to send on every tick"),
                    "interval_seconds": seconds_prop("Seconds between sends; the first send is immediate", true),
                }),
                &["name", "session_id", "message", "interval_seconds"],
            ),
        },
        ToolDefinition {
            name: "stop_timer",
            description: "Stop a timer; returns once no further send can happen",
            input_schema: schema(json!({ "name": string_prop("Timer name") }), &["name"]),
        },
        ToolDefinition {
            name: "start_cycle",
            description: "Repeatedly interrupt a session, run the reconnect command, then the resume command",
            input_schema: schema(
                json!({
                    "name": string_prop("Cycle name"),
                    "session_id": string_prop(SESSION_ID),
                    "interval_seconds": seconds_prop("Seconds between sequences", true),
                    "initial_delay_seconds": seconds_prop("Wait before the first sequence (default 0)", false),
                }),
                &["name", "session_id", "interval_seconds"],
            ),
        },
        ToolDefinition {
            name: "stop_cycle",
            description: "Stop an auto-cycle at its next step boundary",
            input_schema: schema(json!({ "name": string_prop("Cycle name") }), &["name"]),
        },
        ToolDefinition {
            name: "send_interrupt",
            description: "Send Ctrl-C to a session",
            input_schema: schema(
                json!({
                    "session_id": string_prop(SESSION_ID),
                    "count": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_INTERRUPTS,
                        "description": "How many times (default 1)",
                    },
                }),
                &["session_id"],
            ),
        },
        ToolDefinition {
            name: "create_agent_session",
            description: "Create a detached session for an agent on a channel",
            input_schema: schema(
                json!({
                    "name": string_prop("Visible agent name; must not contain ':' or '.'"),
                    "channel": channel_prop("Channel to join"),
                }),
                &["name", "channel"],
            ),
        },
        ToolDefinition {
            name: "find_agents_in_channel",
            description: "List the agents on a channel; BROADCAST lists every session",
            input_schema: schema(
                json!({ "channel": channel_prop("Channel to query") }),
                &["channel"],
            ),
        },
        ToolDefinition {
            name: "broadcast_to_channel",
            description: "Send a message to every agent on a channel; BROADCAST reaches every session",
            input_schema: schema(
                json!({
                    "channel": channel_prop("Target channel"),
                    "message": string_prop("Text to send"),
                }),
                &["channel", "message"],
            ),
        },
        ToolDefinition {
            name: "change_agent_channel",
            description: "Move an agent to another channel by renaming its session",
            input_schema: schema(
                json!({
                    "name": string_prop(SESSION_ID),
                    "new_channel": channel_prop("Channel to move to"),
                }),
                &["name", "new_channel"],
            ),
        },
        ToolDefinition {
            name: "launch_agent",
            description: "Start an AI agent CLI in a session, optionally moving it to a channel first",
            input_schema: schema(
                json!({
                    "agent": { "type": "string", "enum": agents, "description": "Agent to start" },
                    "session_id": string_prop(SESSION_ID),
                    "channel": channel_prop("Optional channel to move the session to"),
                }),
                &["agent", "session_id"],
            ),
        },
        ToolDefinition {
            name: "task_status",
            description: "Status of timers and auto-cycles, including stopped ones and why they stopped",
            input_schema: schema(
                json!({
                    "kind": { "type": "string", "enum": ["timer", "cycle"] },
                    "name": string_prop("Only this task"),
                }),
                &[],
            ),
        },
    ]
}
