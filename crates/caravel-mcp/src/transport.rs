//! Framing layer for MCP stdio communication.
//!
//! Messages are JSON bodies preceded by a `Content-Length` header:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! {"jsonrpc": "2.0", ...}
//! ```
//!
//! The functions here are generic over the underlying stream so they can be
//! exercised against in-memory duplex pipes as well as a child process.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{McpError, Result};

/// Write one framed JSON message.
pub(crate) async fn write_frame<W>(writer: &mut W, message: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(message)?;

    writer
        .write_all(format!("Content-Length: {}\r\n\r\n", json.len()).as_bytes())
        .await?;
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;

    tracing::trace!(content_length = json.len(), "sent framed message");
    Ok(())
}

/// Read one framed JSON body.
///
/// Returns `Ok(None)` on a clean EOF at a frame boundary. EOF in the middle
/// of a frame is a transport fault.
pub(crate) async fn read_frame<R>(reader: &mut BufReader<R>) -> Result<Option<String>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            return if content_length.is_none() {
                Ok(None)
            } else {
                Err(McpError::ConnectionClosed)
            };
        }

        let trimmed = line.trim();

        // Blank line terminates the header block.
        if trimmed.is_empty() {
            break;
        }

        if let Some(len_str) = trimmed.strip_prefix("Content-Length:") {
            content_length = Some(
                len_str
                    .trim()
                    .parse()
                    .map_err(|e| McpError::protocol(format!("invalid Content-Length: {e}")))?,
            );
        }
    }

    let content_length =
        content_length.ok_or_else(|| McpError::protocol("missing Content-Length header"))?;

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    let json = String::from_utf8(body)
        .map_err(|e| McpError::protocol(format!("invalid UTF-8 in message: {e}")))?;

    tracing::trace!(content_length, "received framed message");
    Ok(Some(json))
}
