// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Streaming client for OpenAI-compatible `/chat/completions` endpoints.
//!
//! The Copilot gateway, OpenAI itself, and most local servers speak the same
//! wire format, so a single `OpenAICompatProvider` covers every configured
//! provider id; only the endpoint URL and credential differ.

use std::collections::VecDeque;

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::ProviderError,
    provider::ResponseStream,
    sse::{SseDecoder, SseEvent},
    CompletionRequest, FinishReason, Role, StreamEvent,
};

pub struct OpenAICompatProvider {
    /// Provider id returned by `ChatProvider::name()`.
    driver_name: String,
    /// Full chat completions URL, e.g. `https://api.githubcopilot.com/chat/completions`.
    chat_url: String,
    /// Bearer token (pre-resolved from the auth store or env).
    token: Option<String>,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    /// `base_url` ends before `/chat/completions`.
    pub fn new(driver_name: impl Into<String>, base_url: &str, token: Option<String>) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            driver_name: driver_name.into(),
            chat_url: format!("{base}/chat/completions"),
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl crate::ChatProvider for OpenAICompatProvider {
    fn name(&self) -> &str {
        &self.driver_name
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let messages = crate::build_wire_messages(&req.messages);

        let mut body = json!({
            "model": req.model,
            "messages": messages,
            "stream": true,
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        // The gateway distinguishes human-initiated turns from agent-driven
        // follow-ups (tool-result continuations) by this header.
        let initiator = match req.messages.last().map(|m| m.role) {
            Some(Role::User) => "user",
            _ => "agent",
        };

        debug!(
            driver = %self.driver_name,
            model = %req.model,
            message_count = req.messages.len(),
            tool_count = req.tools.len(),
            initiator,
            "sending completion request"
        );

        let token = self
            .token
            .as_deref()
            .context("no credential for provider; run `bobai login` first")?;
        let http_req = self
            .client
            .post(&self.chat_url)
            .bearer_auth(token)
            .header("content-type", "application/json")
            .header("x-initiator", initiator)
            .json(&body);

        let cancel = req.cancel.clone();
        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Canceled.into()),
            resp = http_req.send() => {
                resp.with_context(|| format!("{} request failed", self.driver_name))?
            }
        };

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body }.into());
        }

        Ok(event_stream(resp, cancel))
    }
}

/// Adapt the HTTP byte stream into typed [`StreamEvent`]s.
///
/// The SSE decoder buffers partial lines across TCP chunks; this layer
/// enforces the terminal contract: exactly one `Finish` is yielded and
/// nothing after it, with `Finish(Stop)` synthesized when the wire stream
/// ends without a `finish_reason`.
fn event_stream(resp: reqwest::Response, cancel: CancellationToken) -> ResponseStream {
    type ByteStream = futures::stream::BoxStream<'static, Result<Vec<u8>, reqwest::Error>>;

    struct State {
        bytes: futures::stream::TakeUntil<ByteStream, futures::future::BoxFuture<'static, ()>>,
        decoder: SseDecoder,
        pending: VecDeque<StreamEvent>,
        input_done: bool,
        cancel: CancellationToken,
    }

    let bytes: ByteStream = resp.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed();
    let cancelled: futures::future::BoxFuture<'static, ()> =
        Box::pin(cancel.clone().cancelled_owned());
    let state = State {
        bytes: bytes.take_until(cancelled),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        input_done: false,
        cancel,
    };

    let stream = futures::stream::try_unfold(state, |mut st| async move {
        loop {
            if let Some(ev) = st.pending.pop_front() {
                if matches!(ev, StreamEvent::Finish(_)) {
                    // Terminal: drop anything decoded after the finish.
                    st.pending.clear();
                    st.input_done = true;
                }
                return Ok(Some((ev, st)));
            }
            if st.input_done {
                return Ok(None);
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    for sse in st.decoder.feed(&chunk)? {
                        match sse {
                            SseEvent::Done => {
                                st.input_done = true;
                                if !st.pending.iter().any(|e| matches!(e, StreamEvent::Finish(_))) {
                                    st.pending.push_back(StreamEvent::Finish(FinishReason::Stop));
                                }
                            }
                            SseEvent::Data(v) => st.pending.extend(parse_chunk(&v)),
                        }
                    }
                }
                Some(Err(e)) => {
                    return Err(ProviderError::Stream(e.to_string()).into());
                }
                None => {
                    if st.cancel.is_cancelled() {
                        return Err(ProviderError::Canceled.into());
                    }
                    st.input_done = true;
                    st.pending.push_back(StreamEvent::Finish(FinishReason::Stop));
                }
            }
        }
    });

    Box::pin(stream)
}

/// Map one decoded response chunk (`choices[0]`) to stream events.
pub(crate) fn parse_chunk(v: &Value) -> Vec<StreamEvent> {
    let choice = &v["choices"][0];
    let delta = &choice["delta"];
    let mut events = Vec::new();

    if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            events.push(StreamEvent::TextDelta(text.to_string()));
        }
    }

    if let Some(tool_calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
        for tc in tool_calls {
            let index = tc["index"].as_u64().unwrap_or(0) as u32;
            let id = tc["id"].as_str().unwrap_or("");
            let name = tc["function"]["name"].as_str().unwrap_or("");
            if !id.is_empty() && !name.is_empty() {
                events.push(StreamEvent::ToolCallStart {
                    index,
                    id: id.to_string(),
                    name: name.to_string(),
                });
            }
            let args = tc["function"]["arguments"].as_str().unwrap_or("");
            if !args.is_empty() {
                events.push(StreamEvent::ToolCallDelta {
                    index,
                    fragment: args.to_string(),
                });
            }
        }
    }

    if let Some(reason) = choice["finish_reason"].as_str() {
        let reason = if reason == "tool_calls" {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        };
        events.push(StreamEvent::Finish(reason));
    }

    events
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn chat_url_appends_path() {
        let p = OpenAICompatProvider::new("copilot", "https://api.githubcopilot.com", None);
        assert_eq!(p.chat_url, "https://api.githubcopilot.com/chat/completions");
    }

    #[test]
    fn base_url_trailing_slash_stripped() {
        let p = OpenAICompatProvider::new("openai", "https://api.openai.com/v1/", None);
        assert_eq!(p.chat_url, "https://api.openai.com/v1/chat/completions");
    }

    // ── parse_chunk ───────────────────────────────────────────────────────────

    #[test]
    fn text_delta_chunk() {
        let v = json!({ "choices": [{ "delta": { "content": "hello" } }] });
        assert_eq!(
            parse_chunk(&v),
            vec![StreamEvent::TextDelta("hello".into())]
        );
    }

    #[test]
    fn empty_content_yields_nothing() {
        let v = json!({ "choices": [{ "delta": { "content": "" } }] });
        assert!(parse_chunk(&v).is_empty());
    }

    #[test]
    fn tool_call_start_with_id_and_name() {
        let v = json!({
            "choices": [{
                "delta": {
                    "tool_calls": [{
                        "index": 0,
                        "id": "call_abc",
                        "function": { "name": "bash", "arguments": "" }
                    }]
                }
            }]
        });
        assert_eq!(
            parse_chunk(&v),
            vec![StreamEvent::ToolCallStart {
                index: 0,
                id: "call_abc".into(),
                name: "bash".into(),
            }]
        );
    }

    #[test]
    fn start_and_first_arguments_in_one_chunk() {
        let v = json!({
            "choices": [{
                "delta": {
                    "tool_calls": [{
                        "index": 1,
                        "id": "c9",
                        "function": { "name": "read_file", "arguments": "{\"pa" }
                    }]
                }
            }]
        });
        assert_eq!(
            parse_chunk(&v),
            vec![
                StreamEvent::ToolCallStart {
                    index: 1,
                    id: "c9".into(),
                    name: "read_file".into(),
                },
                StreamEvent::ToolCallDelta {
                    index: 1,
                    fragment: "{\"pa".into(),
                },
            ]
        );
    }

    #[test]
    fn argument_only_chunk_yields_delta() {
        let v = json!({
            "choices": [{
                "delta": {
                    "tool_calls": [{
                        "index": 0,
                        "function": { "arguments": "th\":\"a\"}" }
                    }]
                }
            }]
        });
        assert_eq!(
            parse_chunk(&v),
            vec![StreamEvent::ToolCallDelta {
                index: 0,
                fragment: "th\":\"a\"}".into(),
            }]
        );
    }

    #[test]
    fn interleaved_indices_preserve_index() {
        let v = json!({
            "choices": [{
                "delta": {
                    "tool_calls": [
                        { "index": 0, "function": { "arguments": "a" } },
                        { "index": 2, "function": { "arguments": "b" } }
                    ]
                }
            }]
        });
        let events = parse_chunk(&v);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::ToolCallDelta { index: 0, .. }));
        assert!(matches!(&events[1], StreamEvent::ToolCallDelta { index: 2, .. }));
    }

    #[test]
    fn finish_reason_stop() {
        let v = json!({ "choices": [{ "delta": {}, "finish_reason": "stop" }] });
        assert_eq!(
            parse_chunk(&v),
            vec![StreamEvent::Finish(FinishReason::Stop)]
        );
    }

    #[test]
    fn finish_reason_tool_calls() {
        let v = json!({ "choices": [{ "delta": {}, "finish_reason": "tool_calls" }] });
        assert_eq!(
            parse_chunk(&v),
            vec![StreamEvent::Finish(FinishReason::ToolCalls)]
        );
    }

    #[test]
    fn unknown_finish_reason_maps_to_stop() {
        let v = json!({ "choices": [{ "delta": {}, "finish_reason": "length" }] });
        assert_eq!(
            parse_chunk(&v),
            vec![StreamEvent::Finish(FinishReason::Stop)]
        );
    }

    #[test]
    fn null_finish_reason_is_not_terminal() {
        let v = json!({ "choices": [{ "delta": { "content": "x" }, "finish_reason": null }] });
        assert_eq!(parse_chunk(&v), vec![StreamEvent::TextDelta("x".into())]);
    }
}
