//! Prompt templates that steer a client agent toward the right tool calls.

use serde::Serialize;
use serde_json::{Map, Value};

use chanmux_tasks::CycleSteps;

#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptDefinition {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: TextContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl PromptMessage {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: TextContent {
                kind: "text",
                text: text.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedPrompt {
    pub description: &'static str,
    pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("unknown prompt {0:?}")]
    Unknown(String),

    #[error("prompt {prompt} requires argument {argument}")]
    MissingArgument {
        prompt: &'static str,
        argument: &'static str,
    },
}

const fn arg(name: &'static str, description: &'static str) -> PromptArgument {
    PromptArgument {
        name,
        description,
        required: true,
    }
}

pub fn prompt_definitions() -> Vec<PromptDefinition> {
    vec![
        PromptDefinition {
            name: "quick_message",
            title: "Quick Message",
            description: "Send a one-off message to a session",
            arguments: vec![
                arg("session_id", "Target session"),
                arg("message", "Text to send"),
            ],
        },
        PromptDefinition {
            name: "setup_timer",
            title: "Setup Timer",
            description: "Send a message to a session on a fixed interval",
            arguments: vec![
                arg("session_id", "Target session"),
                arg("message", "Text to send"),
                arg("interval_seconds", "Seconds between sends"),
            ],
        },
        PromptDefinition {
            name: "manage_auto_cycle",
            title: "Manage Auto Cycle",
            description: "Start or stop the interrupt/reconnect/resume cycle for a session",
            arguments: vec![
                arg("action", "start or stop"),
                arg("session_id", "Target session"),
            ],
        },
        PromptDefinition {
            name: "launch_agent",
            title: "Launch AI Agent",
            description: "Start an agent CLI in a session",
            arguments: vec![
                arg("agent", "gemini, claude, codex or swarm"),
                arg("session_id", "Target session"),
            ],
        },
        PromptDefinition {
            name: "create_agent_network",
            title: "Create Agent Network",
            description: "Create several agents that share a channel",
            arguments: vec![
                arg("agents", "Comma-separated agent names"),
                arg("channel", "Channel they join"),
            ],
        },
        PromptDefinition {
            name: "isolate_agent",
            title: "Isolate Agent",
            description: "Cut an agent off from every other agent",
            arguments: vec![arg("agent_name", "Agent to isolate")],
        },
        PromptDefinition {
            name: "setup_bridge",
            title: "Setup Communication Bridge",
            description: "Relay messages between two channels",
            arguments: vec![
                arg("channel_a", "First channel"),
                arg("channel_b", "Second channel"),
            ],
        },
    ]
}

/// Render prompt `name`. `arguments` is the `prompts/get` arguments object;
/// non-string values are stringified.
pub fn render_prompt(
    name: &str,
    arguments: &Map<String, Value>,
    cycle: &CycleSteps,
) -> Result<RenderedPrompt, PromptError> {
    let def = prompt_definitions()
        .into_iter()
        .find(|d| d.name == name)
        .ok_or_else(|| PromptError::Unknown(name.to_string()))?;

    let get = |argument: &'static str| -> Result<String, PromptError> {
        match arguments.get(argument) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
            Some(v) if !v.is_null() && !v.is_string() => Ok(v.to_string()),
            _ => Err(PromptError::MissingArgument {
                prompt: def.name,
                argument,
            }),
        }
    };

    let user = |text: String| PromptMessage::new(Role::User, text);
    let messages = match def.name {
        "quick_message" => {
            let (session, message) = (get("session_id")?, get("message")?);
            vec![user(format!(
                "Please send the following message to tmux session '{session}':\n\n\
                 Message: {message}\n\n\
                 Use the send_message tool to accomplish this."
            ))]
        }
        "setup_timer" => {
            let (session, message) = (get("session_id")?, get("message")?);
            let interval = get("interval_seconds")?;
            vec![
                user(format!("I want to set up a timer for tmux session '{session}'")),
                user(format!("Message to send: {message}")),
                user(format!("Interval: {interval} seconds")),
                PromptMessage::new(
                    Role::Assistant,
                    "I'll set up a timer to send that message repeatedly with the start_timer tool.",
                ),
            ]
        }
        "manage_auto_cycle" => {
            let (action, session) = (get("action")?, get("session_id")?);
            let text = if action.eq_ignore_ascii_case("start") {
                format!(
                    "Please start the auto-cycle for tmux session '{session}'.\n\n\
                     Each sequence will:\n\
                     1. Send Ctrl-C {count} times\n\
                     2. Wait {reconnect_pause} seconds\n\
                     3. Run '{reconnect}'\n\
                     4. Wait {resume_pause} seconds\n\
                     5. Run '{resume}'\n\n\
                     Use the start_cycle tool and pick an interval_seconds for the repeat.",
                    count = cycle.interrupt_count,
                    reconnect_pause = cycle.pause_before_reconnect.as_secs_f64(),
                    reconnect = cycle.reconnect_command,
                    resume_pause = cycle.pause_before_resume.as_secs_f64(),
                    resume = cycle.resume_command,
                )
            } else {
                format!(
                    "Please stop the auto-cycle for tmux session '{session}'.\n\n\
                     Use task_status to find the cycle's name, then the stop_cycle tool."
                )
            };
            vec![user(text)]
        }
        "launch_agent" => {
            let (agent, session) = (get("agent")?, get("session_id")?);
            vec![user(format!(
                "Please launch the {agent} agent in tmux session '{session}'.\n\n\
                 Available agents:\n\
                 - gemini: Gemini CLI\n\
                 - claude: Claude CLI\n\
                 - codex: Codex CLI\n\
                 - swarm: SwarmCode (uses the 'swarmcode' command)\n\n\
                 Use the launch_agent tool to start the agent."
            ))]
        }
        "create_agent_network" => {
            let (agents, channel) = (get("agents")?, get("channel")?);
            let list: Vec<String> = agents
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(|a| format!("- {a}"))
                .collect();
            vec![user(format!(
                "Please create the following agents on channel {channel}:\n\n{}\n\n\
                 This will allow them to communicate with each other.\n\
                 Use the create_agent_session tool for each agent.",
                list.join("\n")
            ))]
        }
        "isolate_agent" => {
            let agent = get("agent_name")?;
            vec![user(format!(
                "Please isolate agent '{agent}' from all other agents.\n\n\
                 Change their channel to ISOLATED using the change_agent_channel tool.\n\
                 This will prevent them from receiving channel broadcasts."
            ))]
        }
        "setup_bridge" => {
            let (a, b) = (get("channel_a")?, get("channel_b")?);
            vec![user(format!(
                "Please set up communication between channel {a} and channel {b}.\n\n\
                 You'll need to:\n\
                 1. Find agents in both channels using find_agents_in_channel\n\
                 2. Create a bridge agent on the BROADCAST channel\n\
                 3. Relay messages between the channels with broadcast_to_channel"
            ))]
        }
        _ => return Err(PromptError::Unknown(name.to_string())),
    };

    Ok(RenderedPrompt {
        description: def.description,
        messages,
    })
}
