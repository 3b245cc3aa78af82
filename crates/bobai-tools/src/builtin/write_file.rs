// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::context::ExecContext;
use crate::tool::{require_str, Tool, ToolOutput};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a file in the project, overwriting any existing content. \
         Missing parent directories are created. Prefer edit_file for \
         changing parts of an existing file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the project root"
                },
                "content": {
                    "type": "string",
                    "description": "Full content to write"
                }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &Value, ctx: &ExecContext) -> anyhow::Result<ToolOutput> {
        let path = match require_str(args, "path") {
            Ok(p) => p,
            Err(out) => return Ok(out),
        };
        let content = match require_str(args, "content") {
            Ok(c) => c,
            Err(out) => return Ok(out),
        };

        debug!(path = %path, bytes = content.len(), "write_file tool");

        let resolved = match ctx.resolve(&path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(e.to_string())),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolOutput::err(format!("cannot create parent directories: {e}")));
            }
        }

        match tokio::fs::write(&resolved, &content).await {
            Ok(()) => Ok(ToolOutput::ok(format!(
                "wrote {} bytes to {}",
                content.len(),
                ctx.display_path(&resolved)
            ))),
            Err(e) => Ok(ToolOutput::err(format!("write error: {e}"))),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ctx() -> (tempfile::TempDir, ExecContext) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecContext::new(dir.path()).unwrap();
        (dir, ctx)
    }

    #[tokio::test]
    async fn writes_file_and_reports_byte_count() {
        let (dir, ctx) = ctx();
        let out = WriteFileTool
            .execute(&json!({"path": "a.txt", "content": "hello"}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_error, "{}", out.output);
        assert!(out.output.contains("5 bytes"), "{}", out.output);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "hello");
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let (dir, ctx) = ctx();
        let out = WriteFileTool
            .execute(&json!({"path": "deep/nested/f.txt", "content": "x"}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_error, "{}", out.output);
        assert!(dir.path().join("deep/nested/f.txt").is_file());
    }

    #[tokio::test]
    async fn overwrites_existing_content() {
        let (dir, ctx) = ctx();
        std::fs::write(dir.path().join("a.txt"), "old").unwrap();
        let out = WriteFileTool
            .execute(&json!({"path": "a.txt", "content": "new"}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_error);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn escaping_path_is_confined() {
        let (_dir, ctx) = ctx();
        let out = WriteFileTool
            .execute(&json!({"path": "../evil.txt", "content": "x"}), &ctx)
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.output.contains("outside"), "{}", out.output);
    }

    #[tokio::test]
    async fn missing_content_is_error() {
        let (_dir, ctx) = ctx();
        let out = WriteFileTool
            .execute(&json!({"path": "a.txt"}), &ctx)
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.output.contains("'content'"));
    }
}
