// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::context::ExecContext;
use crate::tool::{opt_u64, require_str, Tool, ToolOutput};

/// Captured output beyond this many bytes is dropped with a notice.
const OUTPUT_LIMIT: usize = 50_000;

/// After killing a timed-out process, readers get this long to drain what
/// the pipes already buffered.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

pub struct BashTool {
    pub default_timeout_ms: u64,
}

impl Default for BashTool {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
        }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command with the project root as working directory. \
         stdout and stderr are captured together. timeout is in \
         milliseconds and defaults to 30000; a timed-out command is killed \
         and reported as an error. Output is capped at 50000 bytes. A \
         non-zero exit code is an error with the code embedded in the \
         output."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default 30000)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &Value, ctx: &ExecContext) -> anyhow::Result<ToolOutput> {
        let command = match require_str(args, "command") {
            Ok(c) => c,
            Err(out) => return Ok(out),
        };
        let timeout_ms = opt_u64(args, "timeout").unwrap_or(self.default_timeout_ms);

        debug!(cmd = %command, timeout_ms, "bash tool");

        let mut child = match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(ctx.project_root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return Ok(ToolOutput::err(format!("spawn error: {e}"))),
        };

        // One shared buffer for both pipes so the combined output preserves
        // arrival order rather than segregating stderr at the end.
        let buf: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");
        let out_task = tokio::spawn(pump(stdout, Arc::clone(&buf)));
        let err_task = tokio::spawn(pump(stderr, Arc::clone(&buf)));

        let waited =
            tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait()).await;

        match waited {
            Ok(Ok(status)) => {
                // Readers end at pipe EOF; bound the wait in case a
                // grandchild inherited the pipes and lives on.
                let _ = tokio::time::timeout(
                    DRAIN_GRACE,
                    join_readers(out_task, err_task),
                )
                .await;

                let mut output = capped_output(&buf);
                if status.success() {
                    if output.is_empty() {
                        output = "(no output)".to_string();
                    }
                    Ok(ToolOutput::ok(output))
                } else {
                    let code = status.code().unwrap_or(-1);
                    if !output.is_empty() {
                        output.push('\n');
                    }
                    output.push_str(&format!("exit code: {code}"));
                    Ok(ToolOutput::err(output))
                }
            }
            Ok(Err(e)) => Ok(ToolOutput::err(format!("wait error: {e}"))),
            Err(_) => {
                // Timed out: kill, then give the readers a short grace to
                // drain whatever the pipes already buffered.
                let _ = child.start_kill();
                let _ = tokio::time::timeout(
                    DRAIN_GRACE,
                    join_readers(out_task, err_task),
                )
                .await;
                let _ = child.wait().await;

                let mut output = capped_output(&buf);
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(&format!("(command timed out after {timeout_ms} ms)"));
                Ok(ToolOutput::err(output))
            }
        }
    }
}

async fn pump(mut reader: impl tokio::io::AsyncRead + Unpin, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.lock().unwrap().extend_from_slice(&chunk[..n]),
        }
    }
}

async fn join_readers(
    a: tokio::task::JoinHandle<()>,
    b: tokio::task::JoinHandle<()>,
) {
    let _ = a.await;
    let _ = b.await;
}

/// The captured bytes as text, trimmed of the trailing newline and capped
/// at [`OUTPUT_LIMIT`] bytes.
fn capped_output(buf: &Arc<Mutex<Vec<u8>>>) -> String {
    let bytes = buf.lock().unwrap();
    let total = bytes.len();
    if total <= OUTPUT_LIMIT {
        return String::from_utf8_lossy(&bytes)
            .trim_end_matches('\n')
            .to_string();
    }
    let mut text = String::from_utf8_lossy(&bytes[..OUTPUT_LIMIT]).into_owned();
    text.push_str(&format!(
        "\n(output truncated: {} of {total} bytes shown)",
        OUTPUT_LIMIT
    ));
    text
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
