//! Server-sent event framing for the run output stream.

use crate::error::ApiError;
use crate::model::RunEvent;
use bytes::{Buf, BytesMut};

/// Incremental decoder: feed raw body chunks, get complete `data` payloads back.
///
/// Lines are only split on complete `\n`-terminated input, so a chunk boundary inside a
/// multi-byte character is harmless.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: BytesMut,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            let text = String::from_utf8_lossy(&line[..pos]);
            let text = text.strip_suffix('\r').unwrap_or(&text);
            if let Some(payload) = self.line(text) {
                out.push(payload);
            }
        }
        out
    }

    /// Flush whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.has_remaining() {
            let rest = self.buf.split();
            let text = String::from_utf8_lossy(&rest).into_owned();
            let text = text.strip_suffix('\r').unwrap_or(&text).to_string();
            if let Some(payload) = self.line(&text) {
                return Some(payload);
            }
        }
        self.dispatch()
    }

    fn line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        // `event`, `id` and `retry` carry nothing the dashboard uses.
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        Some(payload)
    }
}

pub(crate) fn decode_event(url: &str, payload: &str) -> Result<RunEvent, ApiError> {
    serde_json::from_str(payload)
        .map_err(|e| ApiError::protocol(url, format!("malformed run event ({e}): {payload}")))
}
