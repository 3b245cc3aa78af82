// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-turn execution context and path confinement.
//!
//! Every path a tool receives resolves against the project root and must end
//! up at the root or a proper descendant of it after symlink resolution.
//! A plain prefix check on the user-supplied string is not enough: `..`
//! segments and symlinks both escape it, so the check runs on the resolved
//! path.

use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context};

/// Context handed to every tool execution.
#[derive(Debug, Clone)]
pub struct ExecContext {
    /// Absolute project root, symlinks resolved.
    project_root: PathBuf,
}

impl ExecContext {
    pub fn new(project_root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = project_root.as_ref();
        let project_root = root
            .canonicalize()
            .with_context(|| format!("project root {} does not exist", root.display()))?;
        Ok(Self { project_root })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolve `raw` against the project root and verify confinement.
    ///
    /// The target itself may not exist yet (tools create files), so symlink
    /// resolution applies to the longest existing ancestor and the remaining
    /// components are appended lexically after `..`/`.` normalization.
    pub fn resolve(&self, raw: &str) -> anyhow::Result<PathBuf> {
        let joined = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            self.project_root.join(raw)
        };
        let normalized = normalize(&joined);
        let resolved = resolve_existing_prefix(&normalized);

        if resolved == self.project_root || resolved.starts_with(&self.project_root) {
            Ok(resolved)
        } else {
            Err(anyhow!("path {raw:?} is outside the project root"))
        }
    }

    /// Like [`resolve`], but a path relative to the root for display.
    pub fn display_path(&self, resolved: &Path) -> String {
        resolved
            .strip_prefix(&self.project_root)
            .unwrap_or(resolved)
            .display()
            .to_string()
    }
}

/// Lexically normalize `.` and `..` components.  `..` at the filesystem
/// root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::RootDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Canonicalize the longest existing prefix of `path` and re-append the
/// non-existing remainder.  This resolves symlinks in directories that do
/// exist while still permitting paths to files that will be created.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut prefix = path.to_path_buf();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();

    loop {
        match prefix.canonicalize() {
            Ok(canon) => {
                let mut result = canon;
                for part in remainder.iter().rev() {
                    result.push(part);
                }
                return result;
            }
            Err(_) => match (prefix.file_name(), prefix.parent()) {
                (Some(name), Some(parent)) => {
                    remainder.push(name.to_os_string());
                    prefix = parent.to_path_buf();
                }
                _ => {
                    // Nothing on the path exists; keep the normalized form.
                    let mut result = prefix;
                    for part in remainder.iter().rev() {
                        result.push(part);
                    }
                    return result;
                }
            },
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
