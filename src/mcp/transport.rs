//! Newline-delimited JSON-RPC framing over any async byte stream.
//!
//! rmcp's stdio transport and service layer are not used here. The loop must
//! stop on the first undecodable line and must leave id-less messages
//! unanswered, and this type keeps both rules in one place.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::{JsonRpcRequest, JsonRpcResponse};

/// Newline-delimited JSON-RPC over an async reader/writer pair.
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
    line: String,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            line: String::new(),
        }
    }

    /// Read the next message. `Ok(None)` means the peer closed the stream.
    ///
    /// Blank lines are skipped. A line that is not a JSON-RPC message is an error.
    pub async fn read_message(&mut self) -> Result<Option<JsonRpcRequest>> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .await
                .context("failed to read message")?;
            if read == 0 {
                return Ok(None);
            }

            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let msg: JsonRpcRequest = serde_json::from_str(trimmed)
                .context("failed to parse JSON-RPC message")?;
            debug!("<- {} id={:?}", msg.method, msg.id);
            return Ok(Some(msg));
        }
    }

    /// Write one response followed by a newline and flush.
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> Result<()> {
        let mut data =
            serde_json::to_vec(response).context("failed to serialize JSON-RPC message")?;
        data.push(b'\n');
        self.writer
            .write_all(&data)
            .await
            .context("failed to write message")?;
        self.writer.flush().await.context("failed to flush message")?;

        match &response.error {
            Some(err) => debug!("-> error id={} {}", response.id, err.message),
            None => debug!("-> result id={}", response.id),
        }
        Ok(())
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}
