// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;

/// Events emitted by the agent loop during one turn, in strict order:
/// all text deltas in stream order, then per tool call (ascending provider
/// index) its `ToolCall` followed by its `ToolResult`.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A text chunk streamed from the model
    TextDelta(String),
    /// The model requested a tool call; arguments are already parsed
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    /// The tool call finished
    ToolResult {
        id: String,
        name: String,
        output: String,
        is_error: bool,
    },
}
