// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::context::ExecContext;
use crate::tool::{opt_u64, require_str, Tool, ToolOutput};

/// Lines returned when the caller does not specify a range end.
const DEFAULT_SPAN: u64 = 2000;

/// A single line longer than this many bytes is cut with a marker.
const MAX_LINE_BYTES: usize = 2000;

/// Hard ceiling on the emitted body.  Whichever of the line range and this
/// cap is hit first determines where the output stops.
const MAX_OUTPUT_BYTES: usize = 50 * 1024;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file from the project. Lines are 1-indexed and \
         prefixed with their number. from defaults to 1 and to defaults to \
         from + 1999 (inclusive). Output is capped at 50 KB; when the cap or \
         the range cuts the file short, the footer names the next from value \
         to continue with. Very long lines are truncated at 2000 bytes."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the project root"
                },
                "from": {
                    "type": "integer",
                    "description": "First line to read, 1-indexed (default 1)"
                },
                "to": {
                    "type": "integer",
                    "description": "Last line to read, inclusive (default from + 1999)"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &Value, ctx: &ExecContext) -> anyhow::Result<ToolOutput> {
        let path = match require_str(args, "path") {
            Ok(p) => p,
            Err(out) => return Ok(out),
        };
        let from = opt_u64(args, "from").unwrap_or(1).max(1) as usize;
        let to = opt_u64(args, "to").unwrap_or(from as u64 + DEFAULT_SPAN - 1) as usize;

        debug!(path = %path, from, to, "read_file tool");

        let resolved = match ctx.resolve(&path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(e.to_string())),
        };
        let text = match tokio::fs::read_to_string(&resolved).await {
            Ok(t) => t,
            Err(e) => return Ok(ToolOutput::err(format!("read error: {e}"))),
        };

        let lines: Vec<&str> = text.lines().collect();
        let total = lines.len();
        if from > total {
            return Ok(ToolOutput::err(format!(
                "from={from} is past the end of the file ({total} lines)"
            )));
        }

        let mut body = String::new();
        let mut last_shown = from - 1;
        let mut byte_capped = false;
        for (i, line) in lines.iter().enumerate().take(to).skip(from - 1) {
            let formatted = format!("{}: {}\n", i + 1, clip_line(line));
            if body.len() + formatted.len() > MAX_OUTPUT_BYTES {
                byte_capped = true;
                break;
            }
            body.push_str(&formatted);
            last_shown = i + 1;
        }

        let footer = if byte_capped {
            format!("(output capped at 50 KB; continue with from={})", last_shown + 1)
        } else if last_shown < total {
            format!(
                "({} more lines; continue with from={})",
                total - last_shown,
                last_shown + 1
            )
        } else {
            format!("(end of file: {total} lines total)")
        };

        Ok(ToolOutput::ok(format!("{body}{footer}")))
    }
}

/// Cut a single line to at most [`MAX_LINE_BYTES`] bytes on a character
/// boundary, marking the cut.
fn clip_line(line: &str) -> String {
    if line.len() <= MAX_LINE_BYTES {
        return line.to_string();
    }
    let mut end = MAX_LINE_BYTES;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &line[..end])
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
