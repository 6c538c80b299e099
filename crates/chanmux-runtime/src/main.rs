//! chanmux: tmux control plane for agent sessions.
//! Channels, message timers and auto-cycles exposed as JSON-RPC tools,
//! served over stdio (default) or a Unix socket.

use std::sync::Arc;

use clap::Parser;

mod cli;
mod client;
mod context;
mod directory;
mod dispatch;
mod prompts;
mod protocol;
mod resources;
mod server;
mod tools;

fn init_logging() {
    let filter = std::env::var("CHANMUX_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    // stdout belongs to the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let command = args.command.unwrap_or(cli::Command::Stdio);
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match command {
        cli::Command::Stdio => {
            init_logging();
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "chanmux starting (stdio)");
            let ctx = Arc::new(context::AppContext::from_opts(
                &args.tmux,
                args.tasks.registry_config(),
            ));
            server::run_stdio(ctx).await?;
        }
        cli::Command::Daemon => {
            init_logging();
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "chanmux daemon starting");
            let ctx = Arc::new(context::AppContext::from_opts(
                &args.tmux,
                args.tasks.registry_config(),
            ));
            server::run_daemon(ctx, &socket_path).await?;
        }
        cli::Command::Call(opts) => {
            client::cmd_call(&socket_path, &opts.tool, &opts.args).await?;
        }
    }

    Ok(())
}
