//! Transports: newline-delimited JSON-RPC over stdio or a Unix socket.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;
use crate::protocol::handle_line;

/// Resolves on ctrl-c or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            },
            Err(e) => {
                tracing::warn!(error = %e, "cannot install SIGTERM handler");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}

// ─── stdio ───────────────────────────────────────────────────────

/// Serve one client on stdin/stdout until EOF or a shutdown signal.
/// Requests are handled in order; stdout carries responses only.
pub async fn run_stdio(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tracing::info!("serving JSON-RPC on stdio");
    let result = loop {
        let line = tokio::select! {
            () = &mut shutdown => break Ok(()),
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("stdin closed");
                break Ok(());
            }
            Err(e) => break Err(anyhow::Error::from(e)),
        };
        if let Some(response) = handle_line(&ctx, &line).await {
            if let Err(e) = write_line(&mut stdout, &response).await {
                break Err(e);
            }
        }
    };

    ctx.shutdown().await;
    result
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> anyhow::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

// ─── Unix socket daemon ──────────────────────────────────────────

/// Run the UDS server until a shutdown signal, then stop every task and
/// remove the socket.
pub async fn run_daemon(ctx: Arc<AppContext>, socket_path: &str) -> anyhow::Result<()> {
    let listener = bind_socket(socket_path).await?;
    let token = CancellationToken::new();

    let server = serve(listener, Arc::clone(&ctx), token.clone());
    tokio::select! {
        () = shutdown_signal() => {}
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "UDS server error");
            }
        }
    }

    token.cancel();
    ctx.shutdown().await;
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}

/// Bind `socket_path`: directory 0700, socket 0600, stale sockets replaced,
/// live ones refused.
pub(crate) async fn bind_socket(socket_path: &str) -> anyhow::Result<UnixListener> {
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path {socket_path}"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    if std::path::Path::new(socket_path).exists() {
        if UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");
    Ok(listener)
}

/// Accept connections until `token` is cancelled. Each connection gets its
/// own task and may send any number of requests.
pub(crate) async fn serve(
    listener: UnixListener,
    ctx: Arc<AppContext>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let (stream, _) = tokio::select! {
            () = token.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        let ctx = Arc::clone(&ctx);
        let token = token.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, ctx, token).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: UnixStream,
    ctx: Arc<AppContext>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = tokio::select! {
            () = token.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        if let Some(response) = handle_line(&ctx, &line).await {
            write_line(&mut writer, &response).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::rpc_call;
    use chanmux_core::{Channel, retag};
    use chanmux_tasks::RegistryConfig;
    use chanmux_tmux::Multiplexer;
    use chanmux_tmux::fake::FakeMultiplexer;
    use serde_json::json;

    fn context(sessions: &[String]) -> Arc<AppContext> {
        let fake = Arc::new(FakeMultiplexer::with_sessions(sessions.iter().cloned()));
        Arc::new(AppContext::new(
            fake as Arc<dyn Multiplexer>,
            RegistryConfig::default(),
        ))
    }

    fn socket_in(dir: &tempfile::TempDir) -> String {
        dir.path()
            .join("run")
            .join("chanmuxd.sock")
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn uds_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = socket_in(&dir);
        let ctx = context(&[retag("agent1", Channel::A), retag("agent3", Channel::B)]);
        let listener = bind_socket(&socket).await.expect("bind");
        let token = CancellationToken::new();
        let server = tokio::spawn(serve(listener, Arc::clone(&ctx), token.clone()));

        let result = rpc_call(
            &socket,
            "tools/call",
            json!({"name": "find_agents_in_channel", "arguments": {"channel": "A"}}),
        )
        .await
        .expect("call");
        assert_eq!(result["isError"], false);
        assert_eq!(result["structuredContent"]["count"], 1);
        assert_eq!(result["structuredContent"]["agents"][0]["display_name"], "agent1");

        let err = rpc_call(&socket, "no/such", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("-32601"), "{err}");

        token.cancel();
        server.await.expect("join").expect("serve");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn socket_permissions_are_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = socket_in(&dir);
        let _listener = bind_socket(&socket).await.expect("bind");
        let mode = std::fs::metadata(&socket).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let parent = std::path::Path::new(&socket).parent().expect("parent");
        let mode = std::fs::metadata(parent).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn stale_socket_is_replaced_live_one_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = socket_in(&dir);
        {
            let _first = bind_socket(&socket).await.expect("bind");
            assert!(bind_socket(&socket).await.is_err(), "live socket must be refused");
        }
        // Listener dropped, file left behind: stale.
        assert!(std::path::Path::new(&socket).exists());
        let _second = bind_socket(&socket).await.expect("rebind over stale socket");
    }
}
