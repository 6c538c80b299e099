//! CLI definition using clap derive.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use chanmux_tasks::{CycleSteps, DuplicatePolicy, RegistryConfig};
use chanmux_tasks::types::{DEFAULT_RECONNECT_COMMAND, DEFAULT_RESUME_COMMAND};

#[derive(Parser)]
#[command(name = "chanmux", version, about = "tmux control plane for agent sessions")]
pub struct Cli {
    /// UDS socket path for `daemon` and `call` (default: /tmp/chanmux-$USER/chanmuxd.sock)
    #[arg(long, short = 's', global = true, env = "CHANMUX_SOCKET")]
    pub socket_path: Option<String>,

    #[command(flatten)]
    pub tmux: TmuxOpts,

    #[command(flatten)]
    pub tasks: TaskOpts,

    /// Defaults to `stdio`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve JSON-RPC on stdin/stdout (one client agent)
    Stdio,
    /// Serve JSON-RPC on a Unix socket (shared by several agents)
    Daemon,
    /// Invoke one tool on a running daemon and print the result
    Call(CallOpts),
}

#[derive(Args, Clone, Debug)]
pub struct TmuxOpts {
    /// tmux binary
    #[arg(long, global = true, env = "CHANMUX_TMUX_BIN", default_value = "tmux")]
    pub tmux_bin: String,

    /// tmux server socket path (`tmux -S`); wins over --tmux-socket-name
    #[arg(long, global = true, env = "CHANMUX_TMUX_SOCKET_PATH")]
    pub tmux_socket: Option<String>,

    /// tmux server socket name (`tmux -L`)
    #[arg(long, global = true, env = "CHANMUX_TMUX_SOCKET_NAME")]
    pub tmux_socket_name: Option<String>,

    /// Per-command timeout in milliseconds
    #[arg(long, global = true, env = "CHANMUX_COMMAND_TIMEOUT_MS", default_value = "5000")]
    pub command_timeout_ms: u64,
}

#[derive(Args, Clone, Debug)]
pub struct TaskOpts {
    /// Pause between typing a message and pressing Enter, in milliseconds
    #[arg(long, global = true, env = "CHANMUX_SUBMIT_DELAY_MS", default_value = "500")]
    pub submit_delay_ms: u64,

    /// Command typed by auto-cycles after the interrupts
    #[arg(long, global = true, env = "CHANMUX_RECONNECT_COMMAND", default_value = DEFAULT_RECONNECT_COMMAND)]
    pub reconnect_command: String,

    /// Command typed by auto-cycles to resume the agent
    #[arg(long, global = true, env = "CHANMUX_RESUME_COMMAND", default_value = DEFAULT_RESUME_COMMAND)]
    pub resume_command: String,

    /// Fail `start_timer`/`start_cycle` on a running name instead of replacing it
    #[arg(long, global = true, env = "CHANMUX_REJECT_DUPLICATE_TASKS")]
    pub reject_duplicate_tasks: bool,
}

#[derive(Args, Clone, Debug)]
pub struct CallOpts {
    /// Tool name, e.g. `list_sessions`
    pub tool: String,

    /// Tool arguments as a JSON object
    #[arg(default_value = "{}")]
    pub args: String,
}

impl TaskOpts {
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            duplicate_policy: if self.reject_duplicate_tasks {
                DuplicatePolicy::Reject
            } else {
                DuplicatePolicy::Replace
            },
            submit_delay: Duration::from_millis(self.submit_delay_ms),
            cycle: CycleSteps {
                reconnect_command: self.reconnect_command.clone(),
                resume_command: self.resume_command.clone(),
                ..CycleSteps::default()
            },
        }
    }
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/chanmux/chanmuxd.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/chanmux-{user}/chanmuxd.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_stdio_and_replace() {
        let cli = Cli::try_parse_from(["chanmux"]).expect("parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.tmux.tmux_bin, "tmux");
        assert_eq!(cli.tmux.command_timeout_ms, 5000);
        let config = cli.tasks.registry_config();
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Replace);
        assert_eq!(config.submit_delay, Duration::from_millis(500));
        assert_eq!(config.cycle.reconnect_command, DEFAULT_RECONNECT_COMMAND);
        assert_eq!(config.cycle.interrupt_count, 5);
    }

    #[test]
    fn call_takes_tool_and_json() {
        let cli = Cli::try_parse_from([
            "chanmux",
            "call",
            "find_agents_in_channel",
            r#"{"channel":"A"}"#,
            "--reject-duplicate-tasks",
        ])
        .expect("parse");
        match cli.command {
            Some(Command::Call(opts)) => {
                assert_eq!(opts.tool, "find_agents_in_channel");
                assert_eq!(opts.args, r#"{"channel":"A"}"#);
            }
            _ => panic!("expected call"),
        }
        assert_eq!(
            cli.tasks.registry_config().duplicate_policy,
            DuplicatePolicy::Reject
        );
    }

    #[test]
    fn default_socket_path_is_per_user() {
        let path = default_socket_path();
        assert!(path.ends_with("chanmuxd.sock"));
    }
}
