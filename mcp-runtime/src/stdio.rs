//! Newline-delimited JSON-RPC over a byte stream.
//!
//! Lock-step: one line in, at most one line out, in order. Notifications
//! produce nothing. End of input ends the loop cleanly.

use std::io;

use meilisearch_mcp_core::jsonrpc::salvage_id;
use meilisearch_mcp_core::{JsonRpcResponse, ProtocolError};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::McpServer;

/// Serves the process's stdin/stdout until stdin closes.
pub async fn serve_stdio(server: &McpServer) -> io::Result<()> {
    tracing::info!(event = "stdio_started", "Serving MCP on stdio");
    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();
    let outcome = serve_lines(server, reader, writer).await;
    tracing::info!(event = "stdio_closed", "stdin closed");
    outcome
}

pub async fn serve_lines<R, W>(server: &McpServer, mut reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }

        let response = match std::str::from_utf8(&buf) {
            Ok(line) => {
                let raw = line.trim();
                if raw.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(raw) {
                    Ok(incoming) => server.handle_value(incoming).await,
                    Err(err) => parse_failure(raw, &err.to_string()),
                }
            }
            Err(err) => parse_failure(String::from_utf8_lossy(&buf).trim(), &err.to_string()),
        };

        if let Some(response) = response {
            write_line(&mut writer, &response).await?;
        }
    }
}

/// A `-32700` reply when an id can be recovered from the raw text,
/// otherwise nothing.
fn parse_failure(raw: &str, error: &str) -> Option<JsonRpcResponse> {
    match salvage_id(raw) {
        Some(id) => Some(JsonRpcResponse::failure(id, &ProtocolError::Parse)),
        None => {
            tracing::warn!(
                event = "stdio_unparseable_line",
                error = %error,
                bytes = raw.len(),
                "Dropping line that is not JSON"
            );
            None
        }
    }
}

async fn write_line<W>(writer: &mut W, response: &JsonRpcResponse) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = serde_json::to_vec(response).map_err(io::Error::other)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}
