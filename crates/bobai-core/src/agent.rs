// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agentic conversation loop: call the provider, stream text out,
//! accumulate tool-call fragments by provider index, execute the requested
//! tools sequentially, persist every produced message, and repeat until the
//! model stops asking for tools or the iteration ceiling is reached.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use bobai_model::{
    ChatMessage, ChatProvider, CompletionRequest, FinishReason, ProviderError, StreamEvent,
    ToolCallRecord,
};
use bobai_store::Role;
use bobai_tools::{ExecContext, ToolOutput, ToolRegistry};

use crate::events::AgentEvent;

pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

/// One durable message produced during a turn, in store shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnMessage {
    pub role: Role,
    pub content: String,
    pub metadata: Option<Value>,
}

impl TurnMessage {
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            metadata: None,
        }
    }

    pub fn assistant_with_calls(text: impl Into<String>, calls: &[ToolCallRecord]) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            metadata: Some(json!({ "tool_calls": calls })),
        }
    }

    pub fn tool(call_id: &str, output: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: output.into(),
            metadata: Some(json!({ "tool_call_id": call_id })),
        }
    }
}

/// Receives every produced message in conversation order (assistant before
/// any of its tool results).  The turn handler persists them to the store.
#[async_trait]
pub trait MessageSink: Send {
    async fn persist(&mut self, msg: &TurnMessage) -> anyhow::Result<()>;
}

/// How the loop ended.  Cancellation is not an error: already-persisted
/// messages stay, the caller just must not emit a terminal frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    Completed,
    Canceled,
}

pub struct AgentLoop<'a> {
    provider: &'a dyn ChatProvider,
    model: &'a str,
    tools: &'a ToolRegistry,
    ctx: &'a ExecContext,
    max_iterations: u32,
    cancel: CancellationToken,
}

impl<'a> AgentLoop<'a> {
    pub fn new(
        provider: &'a dyn ChatProvider,
        model: &'a str,
        tools: &'a ToolRegistry,
        ctx: &'a ExecContext,
    ) -> Self {
        Self {
            provider,
            model,
            tools,
            ctx,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Drive provider ↔ tool iterations until a terminal text response, the
    /// iteration ceiling, or cancellation.
    pub async fn run(
        &self,
        mut conversation: Vec<ChatMessage>,
        tx: mpsc::Sender<AgentEvent>,
        sink: &mut dyn MessageSink,
    ) -> anyhow::Result<LoopOutcome> {
        let schemas: Vec<bobai_model::ToolSchema> = self
            .tools
            .schemas()
            .into_iter()
            .map(|s| bobai_model::ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect();

        for iteration in 1..=self.max_iterations {
            if self.cancel.is_cancelled() {
                return Ok(LoopOutcome::Canceled);
            }
            debug!(iteration, messages = conversation.len(), "provider call");

            let req = CompletionRequest::new(self.model, conversation.clone())
                .with_tools(schemas.clone())
                .with_cancel(self.cancel.clone());

            let (text, calls) = match self.stream_one_iteration(req, &tx).await {
                Ok(t) => t,
                Err(e) if is_canceled(&e) => return Ok(LoopOutcome::Canceled),
                Err(e) => return Err(e),
            };

            // Terminal case: the model finished with plain text (or produced
            // no tool calls at all).
            if calls.is_empty() {
                let msg = TurnMessage::assistant(&text);
                conversation.push(ChatMessage::assistant(&text));
                if self.cancel.is_cancelled() {
                    return Ok(LoopOutcome::Canceled);
                }
                sink.persist(&msg).await?;
                return Ok(LoopOutcome::Completed);
            }

            // Tool-call case: persist the assistant turn first so history
            // replays causally (assistant before its tool results).
            conversation.push(ChatMessage::assistant_with_calls(&text, calls.clone()));
            if self.cancel.is_cancelled() {
                return Ok(LoopOutcome::Canceled);
            }
            sink.persist(&TurnMessage::assistant_with_calls(&text, &calls))
                .await?;

            for call in &calls {
                // Invalid argument JSON becomes {} so the tool's own
                // required-parameter check produces a message the model can
                // act on, instead of the turn aborting.
                let args: Value = serde_json::from_str(&call.arguments).unwrap_or_else(|_| {
                    warn!(
                        tool = %call.name,
                        call_id = %call.id,
                        "unparseable tool arguments; substituting {{}}"
                    );
                    json!({})
                });

                let _ = tx
                    .send(AgentEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: args.clone(),
                    })
                    .await;

                let result = match self.tools.get(&call.name) {
                    None => ToolOutput::err(format!("Unknown tool: {}", call.name)),
                    Some(tool) => match tool.execute(&args, self.ctx).await {
                        Ok(output) => output,
                        Err(e) => ToolOutput::err(format!("Tool execution error: {e}")),
                    },
                };

                let _ = tx
                    .send(AgentEvent::ToolResult {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        output: result.output.clone(),
                        is_error: result.is_error,
                    })
                    .await;

                conversation.push(ChatMessage::tool_result(&call.id, &result.output));
                if self.cancel.is_cancelled() {
                    return Ok(LoopOutcome::Canceled);
                }
                sink.persist(&TurnMessage::tool(&call.id, &result.output))
                    .await?;
            }
        }

        // Ceiling reached while the model was still requesting tools.  This
        // is bounded termination, not an error: record it in the history so
        // a resumed session sees why the turn stopped.
        let n = self.max_iterations;
        let noun = if n == 1 { "iteration" } else { "iterations" };
        let text = format!("Stopped after {n} {noun} — possible runaway loop.");
        let _ = tx.send(AgentEvent::TextDelta(text.clone())).await;
        if self.cancel.is_cancelled() {
            return Ok(LoopOutcome::Canceled);
        }
        sink.persist(&TurnMessage::assistant(&text)).await?;
        Ok(LoopOutcome::Completed)
    }

    /// One provider call: forward text deltas as they arrive, accumulate
    /// tool-call fragments keyed by the provider's local index, and return
    /// the full text plus the collected calls in index order.
    ///
    /// The same index may appear across many chunks and distinct indices
    /// interleave arbitrarily; only the per-index buffers are ordered.
    async fn stream_one_iteration(
        &self,
        req: CompletionRequest,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> anyhow::Result<(String, Vec<ToolCallRecord>)> {
        let mut stream = self.provider.complete(req).await?;

        let mut text = String::new();
        let mut pending: BTreeMap<u32, PendingToolCall> = BTreeMap::new();
        let mut finish = None;

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta(delta) if !delta.is_empty() => {
                    text.push_str(&delta);
                    let _ = tx.send(AgentEvent::TextDelta(delta)).await;
                }
                StreamEvent::TextDelta(_) => {}
                StreamEvent::ToolCallStart { index, id, name } => {
                    let entry = pending.entry(index).or_default();
                    if !id.is_empty() {
                        entry.id = id;
                    }
                    if !name.is_empty() {
                        entry.name = name;
                    }
                }
                StreamEvent::ToolCallDelta { index, fragment } => {
                    pending.entry(index).or_default().args_buf.push_str(&fragment);
                }
                StreamEvent::Finish(reason) => {
                    finish = Some(reason);
                    break;
                }
            }
        }
        // A stream that ends without a finish event is treated as stop.
        let finish = finish.unwrap_or(FinishReason::Stop);

        let calls: Vec<ToolCallRecord> = pending
            .into_values()
            .filter_map(|ptc| {
                if ptc.name.is_empty() {
                    // Cannot be dispatched and would corrupt the history the
                    // provider sees on the next iteration.
                    warn!(call_id = %ptc.id, "dropping tool call with empty name");
                    None
                } else {
                    Some(ToolCallRecord {
                        id: ptc.id,
                        name: ptc.name,
                        arguments: ptc.args_buf,
                    })
                }
            })
            .collect();

        // A stop finish wins over any accumulated fragments.
        if finish == FinishReason::Stop && !calls.is_empty() {
            debug!(
                dropped = calls.len(),
                "provider finished with stop; ignoring partial tool calls"
            );
            return Ok((text, Vec::new()));
        }

        Ok((text, calls))
    }
}

fn is_canceled(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<ProviderError>(), Some(ProviderError::Canceled))
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
