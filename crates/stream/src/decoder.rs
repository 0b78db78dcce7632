//! Incremental frame decoder.
//!
//! Network reads can split an event anywhere, including in the middle of a
//! multi-byte character. [`FrameDecoder`] buffers raw bytes and only parses
//! complete lines.

use crate::frame::{Frame, DATA_PREFIX};
use docstream_core::{AppError, AppResult};

/// Byte-level decoder turning a response body into [`Frame`]s.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes received but not yet terminated by a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed a chunk and return every frame completed by it, in order.
    ///
    /// Blank lines and lines without the `data:` prefix are skipped. A
    /// malformed data line yields an [`AppError::Protocol`] entry; decoding
    /// continues with the next line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<AppResult<Frame>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = parse_line(&line[..line.len() - 1]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<AppResult<Frame>> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

/// Parse one line (without its `\n`). Returns `None` for lines that carry
/// no frame.
fn parse_line(line: &[u8]) -> Option<AppResult<Frame>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() {
        return None;
    }

    let text = match std::str::from_utf8(line) {
        Ok(text) => text,
        Err(e) => {
            return Some(Err(AppError::Protocol(format!(
                "frame is not valid UTF-8: {}",
                e
            ))))
        }
    };

    let payload = text.strip_prefix(DATA_PREFIX)?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    Some(serde_json::from_str::<Frame>(payload).map_err(|e| {
        tracing::debug!("Malformed frame payload: {}", payload);
        AppError::Protocol(format!("malformed frame: {}", e))
    }))
}
