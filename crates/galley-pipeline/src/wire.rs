//! Wire protocol for generation streams: newline-delimited JSON
//! events, one frame per line.

use serde::Deserialize;

/// Events a generation backend emits. Uses `#[serde(other)]` so
/// unknown event types never break an in-flight stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Announces (or revises) how many units this generation will
    /// produce.
    SkeletonCount { total: usize },
    /// One finished unit, addressed by key.
    Unit {
        key: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    /// Terminal success. The backend may reference the artifact it
    /// persisted and attach a human summary.
    Complete {
        #[serde(default)]
        artifact_id: Option<String>,
        #[serde(default)]
        summary: Option<String>,
    },
    /// Terminal failure reported in-band.
    Error { message: String },
    /// Catch-all for event types this client does not know yet.
    #[serde(other)]
    Unknown,
}

/// Incremental frame decoder. Transport chunks split lines at
/// arbitrary byte offsets, so bytes accumulate here until a newline
/// completes a frame.
#[derive(Default)]
pub struct EventParser {
    buf: Vec<u8>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a chunk and return every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(event) = parse_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Decode whatever is left after EOF. Streams are expected to end
    /// each frame with a newline, but a final unterminated frame still
    /// counts.
    pub fn flush(&mut self) -> Option<StreamEvent> {
        let rest = std::mem::take(&mut self.buf);
        parse_line(&rest)
    }
}

/// Decode one frame. Blank lines are skipped; malformed frames are
/// logged and skipped so one bad line cannot kill the session.
fn parse_line(raw: &[u8]) -> Option<StreamEvent> {
    let text = match std::str::from_utf8(raw) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("skipping non-utf8 stream line: {e}");
            return None;
        }
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("skipping malformed stream line: {e}");
            None
        }
    }
}
