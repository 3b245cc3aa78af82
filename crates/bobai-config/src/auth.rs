// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One stored credential.  `token_type` is the scheme the provider expects,
/// normally `"bearer"`; device-flow tokens from the Copilot identity provider
/// use `"oauth"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenEntry {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: String,
}

impl TokenEntry {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            token_type: "bearer".to_string(),
        }
    }
}

/// On-disk credential store: a JSON object keyed by provider id, written
/// with owner-only permissions (0600).
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/bobai/auth.json`.
    pub fn default_path() -> Option<PathBuf> {
        crate::global_config_dir().map(|d| d.join("auth.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored entry.  A missing or malformed file yields an empty
    /// map; credentials are never a startup failure.
    pub fn load_all(&self) -> HashMap<String, TokenEntry> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(_) => return HashMap::new(),
        };
        match serde_json::from_str(&text) {
            Ok(map) => map,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "ignoring malformed auth file");
                HashMap::new()
            }
        }
    }

    pub fn get(&self, provider_id: &str) -> Option<TokenEntry> {
        self.load_all().remove(provider_id)
    }

    /// Store (or replace) the entry for `provider_id`, preserving every other
    /// provider's entry.  The file is created with mode 0600 and existing
    /// files are clamped back to 0600 on every write.
    pub fn save(&self, provider_id: &str, entry: TokenEntry) -> anyhow::Result<()> {
        let mut all = self.load_all();
        all.insert(provider_id.to_string(), entry);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&all)?;
        write_private(&self.path, json.as_bytes())
            .with_context(|| format!("writing {}", self.path.display()))?;
        debug!(provider = provider_id, path = %self.path.display(), "saved token");
        Ok(())
    }

    /// Remove the entry for `provider_id`.  Removing an absent entry is a
    /// no-op.
    pub fn remove(&self, provider_id: &str) -> anyhow::Result<()> {
        let mut all = self.load_all();
        if all.remove(provider_id).is_some() {
            let json = serde_json::to_string_pretty(&all)?;
            write_private(&self.path, json.as_bytes())?;
        }
        Ok(())
    }
}

/// Write `bytes` to `path` with owner-only permissions.
///
/// The file is opened with mode 0600 so the credential bytes never exist on
/// disk with a wider mode, and an existing file's mode is reset in case it
/// was created by an older build.
#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut f = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    f.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    f.write_all(bytes)?;
    f.flush()
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
