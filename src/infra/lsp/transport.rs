//! LSP Transport Layer
//!
//! Handles LSP message framing with Content-Length headers over any async
//! byte stream (child process pipes in production, in-memory pipes in tests).
//!
//! ```text
//! Content-Length: 123\r\n
//! \r\n
//! {"jsonrpc":"2.0",...}
//! ```

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::protocol::Message;
use crate::error::LspError;

const CONTENT_LENGTH: &str = "Content-Length";

/// Largest payload accepted from the peer
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Largest header block (all lines together) accepted from the peer
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Reads one frame at a time from the inbound stream
pub struct MessageReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            line: String::new(),
        }
    }

    /// Read the next frame payload.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames. Any
    /// other failure leaves the stream misaligned and is reported as
    /// [`LspError::Framing`].
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, LspError> {
        let Some(content_length) = self.read_headers().await? else {
            return Ok(None);
        };

        if content_length > MAX_FRAME_BYTES {
            return Err(LspError::Framing(format!(
                "Content-Length {content_length} exceeds the {MAX_FRAME_BYTES} byte limit"
            )));
        }

        // Grow with the bytes actually received rather than trusting the header
        let mut body = Vec::new();
        let received = (&mut self.reader)
            .take(content_length as u64)
            .read_to_end(&mut body)
            .await?;
        if received < content_length {
            return Err(LspError::Framing(format!(
                "stream closed after {received} of {content_length} payload bytes"
            )));
        }

        tracing::trace!("LSP <- {}", String::from_utf8_lossy(&body));
        Ok(Some(body))
    }

    /// Read and decode the next message
    pub async fn read_message(&mut self) -> Result<Option<Message>, LspError> {
        match self.read_frame().await? {
            Some(payload) => Ok(Some(Message::parse(&payload)?)),
            None => Ok(None),
        }
    }

    /// Read headers up to the blank separator line and return Content-Length
    async fn read_headers(&mut self) -> Result<Option<usize>, LspError> {
        let mut content_length: Option<usize> = None;
        let mut at_frame_start = true;
        let mut header_bytes = 0usize;

        loop {
            self.line.clear();
            let budget = MAX_HEADER_BYTES - header_bytes;
            let bytes_read = (&mut self.reader)
                .take(budget as u64)
                .read_line(&mut self.line)
                .await
                .map_err(|e| match e.kind() {
                    io::ErrorKind::InvalidData => {
                        LspError::Framing("header block is not valid UTF-8".to_string())
                    }
                    _ => LspError::Io(e),
                })?;
            header_bytes += bytes_read;

            if bytes_read == budget && !self.line.ends_with('\n') {
                return Err(LspError::Framing(format!(
                    "header block exceeds {MAX_HEADER_BYTES} bytes"
                )));
            }

            if bytes_read == 0 {
                if at_frame_start {
                    return Ok(None);
                }
                return Err(LspError::Framing(
                    "stream closed inside header block".to_string(),
                ));
            }
            at_frame_start = false;

            let line = self.line.trim_end_matches(['\r', '\n']);

            // Empty line marks end of headers
            if line.is_empty() {
                break;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| LspError::Framing(format!("malformed header line: {line:?}")))?;

            // Other headers (Content-Type) are accepted and ignored
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                let value = value.trim();
                content_length = Some(value.parse().map_err(|_| {
                    LspError::Framing(format!("invalid Content-Length: {value:?}"))
                })?);
            }
        }

        content_length
            .map(Some)
            .ok_or_else(|| LspError::Framing("missing Content-Length header".to_string()))
    }
}

/// Writes frames to the outbound stream
pub struct MessageWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one complete frame with a single buffered write
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), LspError> {
        self.writer.write_all(&encode_frame(payload)).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Serialize and write a JSON-RPC envelope
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), LspError> {
        let json = serde_json::to_vec(message)?;
        tracing::trace!("LSP -> {}", String::from_utf8_lossy(&json));
        self.write_frame(&json).await
    }

    /// Close the outbound stream, signalling EOF to the peer
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Prefix a payload with its LSP header block
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", payload.len());
    let mut frame = Vec::with_capacity(header.len() + payload.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(payload);
    frame
}
