//! AppContext: everything a tool call needs, built once at startup.

use std::sync::Arc;
use std::time::Duration;

use chanmux_tasks::{RegistryConfig, TaskRegistry};
use chanmux_tmux::{Multiplexer, TmuxExecutor, TmuxMultiplexer};

use crate::cli::TmuxOpts;
use crate::directory::SessionDirectory;

pub struct AppContext {
    pub mux: Arc<dyn Multiplexer>,
    pub directory: SessionDirectory,
    pub registry: TaskRegistry,
}

impl AppContext {
    pub fn new(mux: Arc<dyn Multiplexer>, config: RegistryConfig) -> Self {
        Self {
            directory: SessionDirectory::new(Arc::clone(&mux)),
            registry: TaskRegistry::new(Arc::clone(&mux), config),
            mux,
        }
    }

    /// Context backed by real tmux.
    pub fn from_opts(tmux: &TmuxOpts, config: RegistryConfig) -> Self {
        let mux: Arc<dyn Multiplexer> = Arc::new(TmuxMultiplexer::new(build_executor(tmux)));
        Self::new(mux, config)
    }

    pub fn submit_delay(&self) -> Duration {
        self.registry.config().submit_delay
    }

    /// Stop every timer and cycle. Call once before exit.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

fn build_executor(opts: &TmuxOpts) -> TmuxExecutor {
    let mut executor = TmuxExecutor::new(opts.tmux_bin.clone())
        .with_timeout(Duration::from_millis(opts.command_timeout_ms));

    // Socket targeting: --tmux-socket > --tmux-socket-name
    if let Some(ref path) = opts.tmux_socket {
        executor = executor.with_socket_path(path.clone());
    } else if let Some(ref name) = opts.tmux_socket_name {
        executor = executor.with_socket_name(name.clone());
    }
    executor
}
