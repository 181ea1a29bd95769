//! Wire protocol between CLI clients and the session daemon.
//!
//! One framed JSON request and one framed JSON response per TCP connection.
//! A frame is a 4-byte big-endian unsigned length followed by exactly that
//! many bytes of UTF-8 JSON. There is no handshake or version negotiation;
//! clients discover the daemon's port through the session port file.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::conversation::MessageSynopsis;

/// Upper bound on a single frame. The protocol itself leaves this open; we
/// enforce 64 MiB symmetrically on encode and decode so a garbled length
/// prefix cannot make a receiver allocate arbitrary memory.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonRequest {
    /// Current file paths plus the conversation display snapshot.
    List,
    /// Reload a fold file: renew the conversation, replace the codebase.
    New { file: String },
    /// One LLM round trip, applying any returned edit payload.
    Query {
        prompt: String,
        #[serde(default)]
        output: Option<String>,
        #[serde(default)]
        input_content: Option<String>,
    },
    /// Acknowledge, then shut the daemon down.
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DaemonResponse {
    Error {
        error: String,
    },
    List {
        files: Vec<String>,
        instructions: Vec<MessageSynopsis>,
    },
    Query {
        message: String,
        summary: String,
        elapsed_secs: f64,
    },
    Message {
        message: String,
    },
}

impl DaemonResponse {
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error { error: msg.into() }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message {
            message: msg.into(),
        }
    }
}

/// Interpret one received frame as a request. Valid JSON with an unknown
/// `cmd` gets the fixed "Unknown command" error; everything else malformed
/// is reported with the parse failure.
pub fn parse_request(value: serde_json::Value) -> Result<DaemonRequest, String> {
    match value.get("cmd").and_then(|v| v.as_str()) {
        Some("list" | "new" | "query" | "down") => {
            serde_json::from_value(value).map_err(|e| format!("invalid request: {e}"))
        }
        Some(_) => Err("Unknown command".to_string()),
        None => Err("invalid request: missing cmd".to_string()),
    }
}

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> anyhow::Result<()> {
    let body = serde_json::to_vec(value)?;
    if body.len() > MAX_FRAME_BYTES {
        anyhow::bail!("frame too large: {} bytes", body.len());
    }
    writer.write_all(&(body.len() as u32).to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> anyhow::Result<T> {
    let body = read_frame_bytes(reader)?;
    serde_json::from_slice(&body).map_err(Into::into)
}

/// Read one frame's body without interpreting it, so callers can separate
/// transport failures from malformed JSON.
pub fn read_frame_bytes<R: Read>(reader: &mut R) -> anyhow::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    recv_full(reader, &mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        anyhow::bail!("frame too large: {len} bytes");
    }
    let mut body = vec![0u8; len];
    recv_full(reader, &mut body)?;
    Ok(body)
}

/// Loop until the buffer is full. A peer that closes the connection before
/// delivering the advertised byte count is a protocol error.
pub fn recv_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> anyhow::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            anyhow::bail!("incomplete data: expected {} bytes, got {filled}", buf.len());
        }
        filled += n;
    }
    Ok(())
}
