// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Incremental decoder for the provider's Server-Sent-Events response body.
//!
//! The wire format is lines grouped into records separated by a blank line;
//! only `data:` lines carry payload.  A record whose payload is the literal
//! `[DONE]` terminates the stream normally; every other payload is JSON.
//!
//! TCP chunk boundaries fall anywhere — mid-line and mid-UTF-8 code point —
//! so the decoder keeps a byte buffer across feeds and only consumes
//! complete `\n`-terminated lines.

use serde_json::Value;

use crate::error::ProviderError;

/// One decoded SSE record.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A parsed `data:` payload.
    Data(Value),
    /// The `[DONE]` end sentinel.
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Unconsumed bytes, ending in a possibly incomplete line.
    buf: Vec<u8>,
    /// `data:` payloads of the record currently being assembled.
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of response bytes; returns every record completed
    /// by this chunk.  Malformed JSON on a `data:` line is fatal for the
    /// request.  Incomplete trailing bytes stay buffered; if the stream ends
    /// without terminating them they are simply never emitted.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, ProviderError> {
        self.buf.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(nl) = self.buf.iter().position(|&b| b == b'\n') {
            let rest = self.buf.split_off(nl + 1);
            let mut line_bytes = std::mem::replace(&mut self.buf, rest);
            line_bytes.pop(); // the \n
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.pop();
            }
            // A complete line never splits a code point on a valid stream.
            let line = String::from_utf8_lossy(&line_bytes).into_owned();

            if line.is_empty() {
                if let Some(ev) = self.flush_record()? {
                    events.push(ev);
                }
            } else if let Some(payload) = line.strip_prefix("data:") {
                let payload = payload.strip_prefix(' ').unwrap_or(payload);
                self.data_lines.push(payload.to_string());
            }
            // Comment lines and event/id/retry fields carry no payload.
        }
        Ok(events)
    }

    fn flush_record(&mut self) -> Result<Option<SseEvent>, ProviderError> {
        if self.data_lines.is_empty() {
            return Ok(None);
        }
        let payload = self.data_lines.join("\n");
        self.data_lines.clear();
        if payload == "[DONE]" {
            return Ok(Some(SseEvent::Done));
        }
        let value: Value = serde_json::from_str(&payload)
            .map_err(|e| ProviderError::Stream(format!("invalid JSON in SSE data: {e}")))?;
        Ok(Some(SseEvent::Data(value)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
