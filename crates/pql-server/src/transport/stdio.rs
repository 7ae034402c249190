//! Stdio transport — reads frames from stdin, writes frames to stdout.

use futures::stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::protocol::{OnDisconnect, Outbound, ProtocolHandler};
use crate::session::AccessMode;
use crate::types::{ServerEnvelope, ServerError, ServerResult};

use super::framing;

/// Single-session transport for pipes and editor integrations.
pub struct StdioTransport {
    handler: ProtocolHandler,
}

impl StdioTransport {
    pub fn new(handler: ProtocolHandler) -> Self {
        Self { handler }
    }

    /// Run the transport loop over the process's stdin and stdout.
    pub async fn run(&self) -> ServerResult<()> {
        self.run_with(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Run over any reader/writer pair. Returns once the reader hits EOF and
    /// every pending frame has been written.
    pub async fn run_with<R, W>(&self, reader: R, writer: W) -> ServerResult<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let config = self.handler.config();
        let (tx, rx) = mpsc::channel(config.outbound_capacity);
        let writer_task = tokio::spawn(write_frames(rx, writer));

        tracing::info!("Stdio transport started");

        let outbound = Outbound::new(tx, config.send_timeout);
        let connection = self
            .handler
            .connect(None, AccessMode::ReadWrite, outbound)
            .await?;

        let lines = BufReader::new(reader).lines();
        let inbound = Box::pin(stream::unfold(lines, |mut lines| async move {
            match lines.next_line().await {
                Ok(Some(line)) => Some((line, lines)),
                Ok(None) => {
                    tracing::info!("EOF on stdin, shutting down");
                    None
                }
                Err(e) => {
                    tracing::warn!("stdin read failed: {e}");
                    None
                }
            }
        }));

        connection.run(inbound, OnDisconnect::Drain).await;

        writer_task
            .await
            .map_err(|e| ServerError::Internal(format!("stdout writer failed: {e}")))?
    }
}

async fn write_frames<W>(mut rx: mpsc::Receiver<ServerEnvelope>, mut writer: W) -> ServerResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        let framed = framing::frame_message(&envelope)?;
        writer.write_all(framed.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
