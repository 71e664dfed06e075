//! Newline framing over a byte stream.
//!
//! The transport owns the stream and a buffer of bytes that do not yet form
//! a complete line. Complete lines already in the buffer are always served
//! before the stream is touched again.

use crate::error::{MpdError, MpdResult};
use pms_core::redact::redact_secrets;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tracing::trace;

const READ_CHUNK: usize = 4096;

/// One classified protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// `OK`: the response completed successfully.
    Ok,
    /// `ACK ...`: the response failed; carries the full line.
    Ack(String),
    /// Any other line, usually `key: value`.
    Data(String),
    /// Nothing complete arrived before the wait expired.
    NoData,
}

pub struct LineTransport<S> {
    stream: S,
    buffer: Vec<u8>,
}

impl<S> LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
        }
    }

    /// Write one command line, appending the terminator. Returns the number
    /// of bytes written.
    pub async fn send(&mut self, command: &str) -> MpdResult<usize> {
        let mut payload = String::with_capacity(command.len() + 1);
        payload.push_str(command);
        payload.push('\n');

        self.stream.write_all(payload.as_bytes()).await?;
        self.stream.flush().await?;
        trace!("-> {}", redact_secrets(command));
        Ok(payload.len())
    }

    /// Whether any received bytes are waiting to be consumed.
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Whether a complete line is waiting in the buffer.
    pub fn has_buffered_line(&self) -> bool {
        self.buffer.contains(&b'\n')
    }

    /// Wait up to `wait` for the stream to become readable.
    ///
    /// Returns `true` when bytes are available (already buffered or freshly
    /// read) and `false` when the wait expired.
    pub async fn wait_readable(&mut self, wait: Duration) -> MpdResult<bool> {
        if self.has_buffered() {
            return Ok(true);
        }
        self.read_more(wait).await
    }

    /// Next line, waiting at most `wait` for it to arrive.
    pub async fn receive_line(&mut self, wait: Duration) -> MpdResult<Line> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(line) = self.take_line() {
                trace!("<- {}", line);
                return classify(line);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.read_more(remaining).await? {
                return Ok(Line::NoData);
            }
        }
    }

    async fn read_more(&mut self, wait: Duration) -> MpdResult<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        match timeout(wait, self.stream.read(&mut chunk)).await {
            Err(_) => Ok(false),
            Ok(Ok(0)) => Err(MpdError::Closed),
            Ok(Ok(n)) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Ok(Err(e)) => Err(MpdError::Io(e)),
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut raw: Vec<u8> = self.buffer.drain(..=pos).collect();
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        Some(String::from_utf8_lossy(&raw).into_owned())
    }
}

fn classify(line: String) -> MpdResult<Line> {
    if line.is_empty() {
        return Err(MpdError::EmptyLine);
    }
    if line == "OK" {
        return Ok(Line::Ok);
    }
    if line.starts_with("ACK") {
        return Ok(Line::Ack(line));
    }
    Ok(Line::Data(line))
}
