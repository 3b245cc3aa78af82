// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::context::ExecContext;
use crate::tool::{opt_str, Tool, ToolOutput};

pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory in the project, one per line. \
         Directories are suffixed with /. path defaults to the project root."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path relative to the project root (default \".\")"
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &Value, ctx: &ExecContext) -> anyhow::Result<ToolOutput> {
        let path = opt_str(args, "path").unwrap_or_else(|| ".".to_string());

        debug!(path = %path, "list_directory tool");

        let resolved = match ctx.resolve(&path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(e.to_string())),
        };

        match tokio::fs::metadata(&resolved).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return Ok(ToolOutput::err(format!("not a directory: {path}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ToolOutput::err(format!("not found: {path}")));
            }
            Err(e) => return Ok(ToolOutput::err(format!("cannot access {path}: {e}"))),
        }

        let mut rd = match tokio::fs::read_dir(&resolved).await {
            Ok(rd) => rd,
            Err(e) => return Ok(ToolOutput::err(format!("cannot access {path}: {e}"))),
        };

        let mut entries: Vec<String> = Vec::new();
        while let Ok(Some(entry)) = rd.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        // Directories first, then alphabetical.
        entries.sort_by(|a, b| {
            b.ends_with('/')
                .cmp(&a.ends_with('/'))
                .then_with(|| a.cmp(b))
        });

        if entries.is_empty() {
            return Ok(ToolOutput::ok("(empty directory)"));
        }
        Ok(ToolOutput::ok(entries.join("\n")))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
