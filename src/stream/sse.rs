//! Incremental Server-Sent Events decoder.
//!
//! Bytes arrive in arbitrary chunks from the HTTP body; frames (and even
//! multi-byte UTF-8 sequences) may be split across chunk boundaries. The decoder
//! buffers until a full line is available and dispatches a frame on each blank
//! line. `id:` and `retry:` fields are ignored: reconnects follow the
//! configured policy and never resume from a last event id.

use tracing::warn;

/// Longest line the decoder buffers. A frame containing a longer line is
/// dropped.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Frame name from `event:`; `message` when absent
    pub event: String,
    /// `data:` lines joined with `\n`
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    pending_cr: bool,
    /// The current line passed `MAX_LINE_BYTES`; its bytes are being skipped
    line_overflow: bool,
    /// Skip everything up to the next blank line
    discard_frame: bool,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes, returning every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        for &byte in chunk {
            // A `\r\n` pair may straddle two chunks.
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut frames),
                b'\r' => {
                    self.pending_cr = true;
                    self.end_line(&mut frames);
                }
                _ if self.line_overflow => {}
                _ if self.line.len() >= MAX_LINE_BYTES => {
                    warn!(limit = MAX_LINE_BYTES, "stream line too long; dropping frame");
                    self.line_overflow = true;
                    self.line = Vec::new();
                }
                _ => self.line.push(byte),
            }
        }

        frames
    }

    fn end_line(&mut self, frames: &mut Vec<SseFrame>) {
        let raw = std::mem::take(&mut self.line);
        if std::mem::take(&mut self.line_overflow) {
            self.discard_frame = true;
            return;
        }
        let line = String::from_utf8_lossy(&raw);

        if line.is_empty() {
            if std::mem::take(&mut self.discard_frame) {
                self.event = None;
                self.data.clear();
                return;
            }
            if let Some(frame) = self.dispatch() {
                frames.push(frame);
            }
            return;
        }

        // Comment line, commonly used as a keep-alive by proxies.
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.find(':') {
            Some(idx) => {
                let value = &line[idx + 1..];
                (&line[..idx], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line.as_ref(), ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);

        // Named frames without data are still delivered: some backends send
        // `event: heartbeat` with an empty body.
        if data.is_empty() && event.is_none() {
            return None;
        }

        Some(SseFrame {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data: data.join("\n"),
        })
    }
}
