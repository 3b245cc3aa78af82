// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::context::ExecContext;
use crate::tool::{opt_str, require_str, Tool, ToolOutput};

/// Matches beyond this count are dropped with a notice.
const MATCH_LIMIT: usize = 100;

/// Directories never worth searching.
static EXCLUDED_DIRS: &[&str] = &[".git", ".bobai", "target", "node_modules", "__pycache__"];

pub struct GrepSearchTool;

#[async_trait]
impl Tool for GrepSearchTool {
    fn name(&self) -> &str {
        "grep_search"
    }

    fn description(&self) -> &str {
        "Search file contents recursively with a regular expression. \
         Results are path:line:content rows, capped at 100 matches. \
         path restricts the search to a subdirectory; include filters file \
         names with a glob such as *.rs or *.test.ts. Finding nothing is a \
         normal result, not an error."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search, relative to the project root (default \".\")"
                },
                "include": {
                    "type": "string",
                    "description": "Glob filter on file names, e.g. *.rs"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &Value, ctx: &ExecContext) -> anyhow::Result<ToolOutput> {
        let pattern = match require_str(args, "pattern") {
            Ok(p) => p,
            Err(out) => return Ok(out),
        };
        let path = opt_str(args, "path").unwrap_or_else(|| ".".to_string());
        let include = opt_str(args, "include");

        debug!(pattern = %pattern, path = %path, "grep_search tool");

        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => return Ok(ToolOutput::err(format!("invalid pattern: {e}"))),
        };
        let include_re = match include.as_deref().map(glob_to_regex) {
            None => None,
            Some(Ok(re)) => Some(re),
            Some(Err(e)) => return Ok(ToolOutput::err(format!("invalid include glob: {e}"))),
        };
        let root = match ctx.resolve(&path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(e.to_string())),
        };
        if !root.is_dir() {
            return Ok(ToolOutput::err(format!("not a directory: {path}")));
        }

        // The walk is blocking filesystem work; keep it off the runtime.
        let project_root = ctx.project_root().to_path_buf();
        let result = tokio::task::spawn_blocking(move || {
            search(&project_root, &root, &re, include_re.as_ref())
        })
        .await?;

        if result.rows.is_empty() {
            return Ok(ToolOutput::ok("No matches found"));
        }
        let mut output = result.rows.join("\n");
        if result.truncated {
            output.push_str(&format!(
                "\n(more than {MATCH_LIMIT} matches; showing the first {MATCH_LIMIT} — narrow \
                 the pattern, path, or include filter)"
            ));
        }
        Ok(ToolOutput::ok(output))
    }
}

struct SearchResult {
    rows: Vec<String>,
    truncated: bool,
}

fn search(
    project_root: &std::path::Path,
    root: &std::path::Path,
    re: &Regex,
    include: Option<&Regex>,
) -> SearchResult {
    let mut rows = Vec::new();
    let mut truncated = false;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(e.file_type().is_dir() && EXCLUDED_DIRS.contains(&name.as_ref()))
        });

    'files: for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(include) = include {
            let name = entry.file_name().to_string_lossy();
            if !include.is_match(&name) {
                continue;
            }
        }
        // Binary and unreadable files are skipped silently.
        let content = match std::fs::read(entry.path()) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Err(_) => continue,
        };
        let rel = entry
            .path()
            .strip_prefix(project_root)
            .unwrap_or(entry.path())
            .display()
            .to_string();
        for (lineno, line) in content.lines().enumerate() {
            if re.is_match(line) {
                if rows.len() >= MATCH_LIMIT {
                    truncated = true;
                    break 'files;
                }
                rows.push(format!("{rel}:{}:{line}", lineno + 1));
            }
        }
    }

    SearchResult { rows, truncated }
}

/// Translate a file-name glob into a [`Regex`].  Supports `*` and `?`;
/// everything else matches literally.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ctx_with(files: &[(&str, &str)]) -> (tempfile::TempDir, ExecContext) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        let ctx = ExecContext::new(dir.path()).unwrap();
        (dir, ctx)
    }

    #[tokio::test]
    async fn finds_matches_as_path_line_content_rows() {
        let (_d, ctx) = ctx_with(&[("src/lib.rs", "fn alpha() {}\nfn beta() {}\n")]);
        let out = GrepSearchTool
            .execute(&json!({"pattern": "fn beta"}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_error, "{}", out.output);
        assert_eq!(out.output, "src/lib.rs:2:fn beta() {}");
    }

    #[tokio::test]
    async fn no_matches_is_success() {
        let (_d, ctx) = ctx_with(&[("a.txt", "nothing here\n")]);
        let out = GrepSearchTool
            .execute(&json!({"pattern": "zzz_absent"}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_error);
        assert_eq!(out.output, "No matches found");
    }

    #[tokio::test]
    async fn include_glob_filters_files() {
        let (_d, ctx) = ctx_with(&[("a.rs", "needle\n"), ("a.txt", "needle\n")]);
        let out = GrepSearchTool
            .execute(&json!({"pattern": "needle", "include": "*.rs"}), &ctx)
            .await
            .unwrap();
        assert!(out.output.contains("a.rs"), "{}", out.output);
        assert!(!out.output.contains("a.txt"), "{}", out.output);
    }

    #[tokio::test]
    async fn path_restricts_search_root() {
        let (_d, ctx) = ctx_with(&[("sub/in.txt", "needle\n"), ("out.txt", "needle\n")]);
        let out = GrepSearchTool
            .execute(&json!({"pattern": "needle", "path": "sub"}), &ctx)
            .await
            .unwrap();
        assert!(out.output.contains("sub/in.txt"), "{}", out.output);
        assert!(!out.output.contains("out.txt"), "{}", out.output);
    }

    #[tokio::test]
    async fn results_over_limit_are_truncated_with_notice() {
        let many: String = (0..150).map(|i| format!("needle {i}\n")).collect();
        let (_d, ctx) = ctx_with(&[("big.txt", &many)]);
        let out = GrepSearchTool
            .execute(&json!({"pattern": "needle"}), &ctx)
            .await
            .unwrap();
        let rows = out.output.lines().filter(|l| l.contains("big.txt:")).count();
        assert_eq!(rows, 100);
        assert!(out.output.contains("more than 100"), "{}", out.output);
    }

    #[tokio::test]
    async fn excluded_directories_are_skipped() {
        let (_d, ctx) = ctx_with(&[
            (".git/objects/x", "needle\n"),
            ("node_modules/m/i.js", "needle\n"),
            ("src/real.rs", "needle\n"),
        ]);
        let out = GrepSearchTool
            .execute(&json!({"pattern": "needle"}), &ctx)
            .await
            .unwrap();
        assert!(out.output.contains("src/real.rs"), "{}", out.output);
        assert!(!out.output.contains(".git"), "{}", out.output);
        assert!(!out.output.contains("node_modules"), "{}", out.output);
    }

    #[tokio::test]
    async fn binary_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bin.dat"), b"nee\x00dle").unwrap();
        std::fs::write(dir.path().join("ok.txt"), "needle\n").unwrap();
        let ctx = ExecContext::new(dir.path()).unwrap();
        let out = GrepSearchTool
            .execute(&json!({"pattern": "needle"}), &ctx)
            .await
            .unwrap();
        assert!(out.output.contains("ok.txt"), "{}", out.output);
        assert!(!out.output.contains("bin.dat"), "{}", out.output);
    }

    #[tokio::test]
    async fn invalid_pattern_is_error() {
        let (_d, ctx) = ctx_with(&[]);
        let out = GrepSearchTool
            .execute(&json!({"pattern": "([unclosed"}), &ctx)
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.output.contains("invalid pattern"), "{}", out.output);
    }

    #[tokio::test]
    async fn escaping_path_is_confined() {
        let (_d, ctx) = ctx_with(&[]);
        let out = GrepSearchTool
            .execute(&json!({"pattern": "x", "path": "../.."}), &ctx)
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.output.contains("outside"), "{}", out.output);
    }

    #[test]
    fn glob_translation_handles_star_and_question() {
        let re = glob_to_regex("*.rs").unwrap();
        assert!(re.is_match("main.rs"));
        assert!(!re.is_match("main.rs.bak"));
        let re = glob_to_regex("a?.txt").unwrap();
        assert!(re.is_match("ab.txt"));
        assert!(!re.is_match("abc.txt"));
    }

    #[test]
    fn glob_translation_escapes_regex_metacharacters() {
        let re = glob_to_regex("a+b.txt").unwrap();
        assert!(re.is_match("a+b.txt"));
        assert!(!re.is_match("aab.txt"));
    }
}
