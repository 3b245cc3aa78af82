// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::context::ExecContext;
use crate::tool::{require_str, Tool, ToolOutput};

/// Context lines shown around the applied edit.
const EXCERPT_CONTEXT: usize = 3;

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace one occurrence of old_string with new_string in a file. \
         old_string is matched as a literal substring (not a regex) and must \
         occur exactly once in the file; include enough surrounding lines to \
         make it unique. new_string is inserted literally. Returns an \
         excerpt of the file around the edit."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the project root"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace; must occur exactly once"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text, inserted literally"
                }
            },
            "required": ["path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &Value, ctx: &ExecContext) -> anyhow::Result<ToolOutput> {
        let path = match require_str(args, "path") {
            Ok(p) => p,
            Err(out) => return Ok(out),
        };
        let old_string = match require_str(args, "old_string") {
            Ok(s) => s,
            Err(out) => return Ok(out),
        };
        let new_string = match require_str(args, "new_string") {
            Ok(s) => s,
            Err(out) => return Ok(out),
        };
        if old_string.is_empty() {
            return Ok(ToolOutput::err("old_string must not be empty"));
        }

        debug!(path = %path, "edit_file tool");

        let resolved = match ctx.resolve(&path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(e.to_string())),
        };
        let content = match tokio::fs::read_to_string(&resolved).await {
            Ok(c) => c,
            Err(e) => return Ok(ToolOutput::err(format!("read error: {e}"))),
        };

        // Literal substring match; the count decides between the two
        // distinct failure modes and the success path.
        let positions: Vec<usize> = content
            .match_indices(&old_string)
            .map(|(i, _)| i)
            .collect();
        let pos = match positions.len() {
            0 => {
                return Ok(ToolOutput::err(format!(
                    "old_string not found in {path}; re-read the file and match its current content exactly"
                )));
            }
            1 => positions[0],
            n => {
                return Ok(ToolOutput::err(format!(
                    "old_string has multiple matches ({n}) in {path}; include more surrounding \
                     context so it matches exactly once"
                )));
            }
        };

        // Splice rather than replace so the new string is inserted literally
        // even when it contains $-style or backslash sequences.
        let mut new_content = String::with_capacity(content.len() + new_string.len());
        new_content.push_str(&content[..pos]);
        new_content.push_str(&new_string);
        new_content.push_str(&content[pos + old_string.len()..]);

        if let Err(e) = tokio::fs::write(&resolved, &new_content).await {
            return Ok(ToolOutput::err(format!("write error: {e}")));
        }

        let excerpt = excerpt_around(&new_content, pos, new_string.len());
        Ok(ToolOutput::ok(format!(
            "edited {}:\n{excerpt}",
            ctx.display_path(&resolved)
        )))
    }
}

/// Numbered excerpt of `content` spanning the replaced region plus
/// [`EXCERPT_CONTEXT`] lines on each side.
fn excerpt_around(content: &str, start: usize, len: usize) -> String {
    let first_edit_line = content[..start].matches('\n').count();
    let last_edit_line = content[..(start + len).min(content.len())]
        .matches('\n')
        .count();
    let lines: Vec<&str> = content.lines().collect();
    let from = first_edit_line.saturating_sub(EXCERPT_CONTEXT);
    let to = (last_edit_line + EXCERPT_CONTEXT).min(lines.len().saturating_sub(1));

    lines[from..=to]
        .iter()
        .enumerate()
        .map(|(i, l)| format!("{}: {}", from + i + 1, l))
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
