//! UDS JSON-RPC client for the `call` subcommand.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub(crate) async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if line.trim().is_empty() {
        anyhow::bail!("daemon closed the connection without replying");
    }

    let response: serde_json::Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }

    Ok(response["result"].clone())
}

/// `chanmux call <tool> [json]`: print the tool's structured result.
/// A tool-level error is printed too, and turned into a failing exit.
pub async fn cmd_call(socket_path: &str, tool: &str, args: &str) -> anyhow::Result<()> {
    let arguments: serde_json::Value = serde_json::from_str(args)
        .map_err(|e| anyhow::anyhow!("tool arguments must be JSON: {e}"))?;
    let result = rpc_call(
        socket_path,
        "tools/call",
        serde_json::json!({ "name": tool, "arguments": arguments }),
    )
    .await?;

    let payload = &result["structuredContent"];
    println!("{}", serde_json::to_string_pretty(payload)?);

    if result["isError"].as_bool() == Some(true) {
        let kind = payload["error"]["kind"].as_str().unwrap_or("error");
        anyhow::bail!("{tool} failed: {kind}");
    }
    Ok(())
}
