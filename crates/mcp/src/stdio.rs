//! Line-delimited JSON-RPC over a byte stream.
//!
//! One message per line in, one response per line out. Notifications get
//! no output line. stdout must carry nothing else, so logs go to stderr.

use crate::handler::{McpHandler, McpSession};
use hive_common::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Serve one session until `reader` hits EOF.
pub async fn serve_lines<R, W>(
    handler: &McpHandler,
    session: &mut McpSession,
    reader: R,
    mut writer: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(response) = handler.handle_message(session, line).await else {
            continue;
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }

    debug!("Input closed");
    Ok(())
}

/// Serve a local session on the process's stdin and stdout.
pub async fn serve_stdio(handler: &McpHandler) -> Result<()> {
    info!("Serving MCP over stdio");
    let mut session = McpSession::local();
    serve_lines(
        handler,
        &mut session,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}
