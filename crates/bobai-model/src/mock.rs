// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{
    provider::ResponseStream, CompletionRequest, FinishReason, ProviderError, StreamEvent,
};

/// A pre-scripted provider.  Each call to `complete` pops the next response
/// script from the front of the queue, which lets tests specify exact event
/// sequences — including interleaved tool-call fragments — without network
/// access.
pub struct ScriptedProvider {
    scripts: Arc<Mutex<Vec<Script>>>,
    /// Every `CompletionRequest` seen by this provider, in call order, so
    /// tests can inspect the projected history that was sent.
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

/// One provider call's outcome: a sequence of events, or an HTTP failure.
pub enum Script {
    Events(Vec<StreamEvent>),
    Status { status: u16, body: String },
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Convenience: a provider that always streams `text` then stops.
    pub fn always_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(vec![Script::Events(vec![
            StreamEvent::TextDelta(text),
            StreamEvent::Finish(FinishReason::Stop),
        ])])
    }

    /// Convenience: one tool call (arguments delivered in a single fragment)
    /// followed by a text reply on the next call.
    pub fn tool_then_text(
        id: impl Into<String>,
        name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            Script::Events(vec![
                StreamEvent::ToolCallStart {
                    index: 0,
                    id: id.into(),
                    name: name.into(),
                },
                StreamEvent::ToolCallDelta {
                    index: 0,
                    fragment: args_json.into(),
                },
                StreamEvent::Finish(FinishReason::ToolCalls),
            ]),
            Script::Events(vec![
                StreamEvent::TextDelta(final_text.into()),
                StreamEvent::Finish(FinishReason::Stop),
            ]),
        ])
    }

    /// Number of completion calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl crate::ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        self.requests.lock().unwrap().push(req);
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                // Fallback when all scripts are consumed: behave like a
                // model with nothing left to say.
                Script::Events(vec![StreamEvent::Finish(FinishReason::Stop)])
            } else {
                scripts.remove(0)
            }
        };
        match script {
            Script::Events(events) => {
                let wrapped: Vec<anyhow::Result<StreamEvent>> =
                    events.into_iter().map(Ok).collect();
                Ok(Box::pin(stream::iter(wrapped)))
            }
            Script::Status { status, body } => Err(ProviderError::Status { status, body }.into()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
