//! peershare wire format: response frames and the raw file stream.
//!
//! Every response is one frame: a 4-byte big-endian length followed by that
//! many bytes of JSON `{"status": ..., "message": ...}`. A reader always knows
//! where a frame ends, which matters for downloads: a `SENDING_FILE` frame is
//! followed on the same connection by a file stream and then another frame.
//!
//! File stream: an 8-byte big-endian byte count, then exactly that many raw
//! bytes. Nothing else is interleaved.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single response frame. Listings of very large
/// registries are the only thing that gets near it.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Size of the response frame length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

// ── Response ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Ok,
    Error,
    /// A raw file stream for one file follows this response.
    SendingFile,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseStatus::Ok => "OK",
            ResponseStatus::Error => "ERROR",
            ResponseStatus::SendingFile => "SENDING_FILE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub message: String,
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
        }
    }

    pub fn sending_file(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::SendingFile,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    /// Encode as a complete frame (length prefix + JSON body).
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let body = serde_json::to_vec(self).map_err(WireError::Encode)?;
        if body.len() > MAX_RESPONSE_BYTES {
            return Err(WireError::FrameTooLarge(body.len()));
        }
        let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len());
        frame.put_u32(body.len() as u32);
        frame.put_slice(&body);
        Ok(frame.freeze())
    }

    /// Decode a frame body (without the length prefix).
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(body).map_err(WireError::Decode)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status, self.message)
    }
}

// ── Framed I/O ────────────────────────────────────────────────────────────────

/// Read one command line of at most `max_len` bytes, newline excluded.
///
/// Returns `None` on a clean EOF. A final line without a trailing newline is
/// still returned. Invalid UTF-8 is replaced rather than rejected; the
/// command parser reports whatever comes out as an unknown command.
pub async fn read_command_line<R>(reader: &mut R, max_len: usize) -> Result<Option<String>, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = max_len as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if n as u64 == limit {
        return Err(WireError::LineTooLong(max_len));
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Write one response frame and flush.
pub async fn write_response<W>(writer: &mut W, response: &Response) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let frame = response.encode()?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one response frame.
pub async fn read_response<R>(reader: &mut R) -> Result<Response, WireError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_RESPONSE_BYTES {
        return Err(WireError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Response::decode(&body)
}

/// Send `len` bytes from `source` as a file stream.
///
/// Fails with `ShortStream` if `source` ends before `len` bytes; the peer
/// cannot be resynchronised after that, so the caller drops the connection.
pub async fn write_file_stream<W, R>(writer: &mut W, source: &mut R, len: u64) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    writer.write_u64(len).await?;
    let sent = tokio::io::copy(&mut (&mut *source).take(len), writer).await?;
    if sent != len {
        return Err(WireError::ShortStream {
            expected: len,
            actual: sent,
        });
    }
    writer.flush().await?;
    Ok(())
}

/// Receive a file stream into `sink`. Returns the number of bytes copied.
pub async fn read_file_stream<R, W>(reader: &mut R, sink: &mut W) -> Result<u64, WireError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let len = reader.read_u64().await?;
    let received = tokio::io::copy(&mut (&mut *reader).take(len), sink).await?;
    if received != len {
        return Err(WireError::ShortStream {
            expected: len,
            actual: received,
        });
    }
    sink.flush().await?;
    Ok(received)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("response frame of {0} bytes exceeds maximum {}", MAX_RESPONSE_BYTES)]
    FrameTooLarge(usize),

    #[error("failed to encode response: {0}")]
    Encode(serde_json::Error),

    #[error("failed to decode response: {0}")]
    Decode(serde_json::Error),

    #[error("command line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("file stream ended after {actual} of {expected} bytes")]
    ShortStream { expected: u64, actual: u64 },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
