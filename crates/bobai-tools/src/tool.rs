// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecContext;

/// The result of executing a tool.
///
/// Domain failures (bad arguments, confinement violations, I/O errors,
/// non-zero exits) are ordinary results with `is_error = true` so the agent
/// loop can feed them back to the model; they are never transport failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub output: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            output: msg.into(),
            is_error: true,
        }
    }
}

/// Trait that every built-in tool implements.
///
/// `name` and the argument names inside `parameters_schema` are wire
/// contract with the provider; renaming them breaks deployed models.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the arguments object
    fn parameters_schema(&self) -> Value;
    /// Execute the tool.  Domain failures become [`ToolOutput::err`]; an
    /// `Err` return is an internal fault that the agent loop converts into
    /// a `"Tool execution error: …"` result.
    async fn execute(&self, args: &Value, ctx: &ExecContext) -> anyhow::Result<ToolOutput>;
}

// ─── Argument helpers ─────────────────────────────────────────────────────────

/// Read a required string argument, or produce the standard error output.
pub(crate) fn require_str(args: &Value, key: &str) -> Result<String, ToolOutput> {
    match args.get(key).and_then(|v| v.as_str()) {
        Some(s) => Ok(s.to_string()),
        None => {
            let preview = serde_json::to_string(args).unwrap_or_else(|_| "null".to_string());
            Err(ToolOutput::err(format!(
                "missing required parameter '{key}'. Received: {preview}"
            )))
        }
    }
}

pub(crate) fn opt_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

pub(crate) fn opt_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(|v| v.as_u64())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
