// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod auth;
mod project;

pub use auth::{TokenEntry, TokenStore};
pub use project::{ensure_project, project_paths, ProjectFile, ProjectPaths};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Built-in provider default.  Callers never encode this; they go through
/// [`resolve`] so that project and global preferences take priority.
pub const DEFAULT_PROVIDER: &str = "copilot";

/// Built-in model default, paired with [`DEFAULT_PROVIDER`].
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// One configuration layer.  Both the project file (`.bobai/bobai.json`) and
/// the global preferences file (`<config_dir>/bobai/bobai.json`) deserialize
/// into this shape; fields the layer does not define stay `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Fully resolved configuration: every field has a concrete value.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub provider: String,
    pub model: String,
}

/// Resolve `provider` and `model` independently: project layer first, then
/// global preferences, then the built-in defaults.
pub fn resolve(project: &ConfigLayer, global: &ConfigLayer) -> ResolvedConfig {
    ResolvedConfig {
        provider: project
            .provider
            .clone()
            .or_else(|| global.provider.clone())
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
        model: project
            .model
            .clone()
            .or_else(|| global.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
    }
}

/// Load one configuration layer from `path`.
///
/// A missing or unparseable file is an empty layer, not an error: the
/// resolver falls through to the next layer.
pub fn load_layer(path: &Path) -> ConfigLayer {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return ConfigLayer::default(),
    };
    match serde_json::from_str(&text) {
        Ok(layer) => {
            debug!(path = %path.display(), "loaded config layer");
            layer
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring malformed config layer");
            ConfigLayer::default()
        }
    }
}

/// Platform-conventional global configuration directory (`…/bobai`).
pub fn global_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bobai"))
}

/// Path of the global preferences file, if a config directory exists.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|d| d.join("bobai.json"))
}

/// Convenience: load both layers for `project_root` and resolve.
pub fn resolve_for_project(project_root: &Path) -> ResolvedConfig {
    let paths = project_paths(project_root);
    let project = load_layer(&paths.config_file);
    let global = global_config_path()
        .map(|p| load_layer(&p))
        .unwrap_or_default();
    resolve(&project, &global)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(provider: Option<&str>, model: Option<&str>) -> ConfigLayer {
        ConfigLayer {
            provider: provider.map(str::to_string),
            model: model.map(str::to_string),
        }
    }

    // ── Layer precedence ──────────────────────────────────────────────────────

    #[test]
    fn defaults_when_both_layers_empty() {
        let r = resolve(&ConfigLayer::default(), &ConfigLayer::default());
        assert_eq!(r.provider, DEFAULT_PROVIDER);
        assert_eq!(r.model, DEFAULT_MODEL);
    }

    #[test]
    fn project_layer_wins_over_global() {
        let r = resolve(
            &layer(Some("openai"), Some("gpt-4o-mini")),
            &layer(Some("copilot"), Some("gpt-4o")),
        );
        assert_eq!(r.provider, "openai");
        assert_eq!(r.model, "gpt-4o-mini");
    }

    #[test]
    fn global_layer_fills_fields_the_project_omits() {
        let r = resolve(&layer(None, Some("gpt-4o-mini")), &layer(Some("openai"), None));
        assert_eq!(r.provider, "openai", "provider comes from global");
        assert_eq!(r.model, "gpt-4o-mini", "model comes from project");
    }

    #[test]
    fn fields_resolve_independently() {
        // Project sets only the model; provider falls through global to default.
        let r = resolve(&layer(None, Some("m")), &ConfigLayer::default());
        assert_eq!(r.provider, DEFAULT_PROVIDER);
        assert_eq!(r.model, "m");
    }

    // ── Layer loading ─────────────────────────────────────────────────────────

    #[test]
    fn missing_file_is_empty_layer() {
        let layer = load_layer(Path::new("/tmp/bobai_no_such_config_xyz.json"));
        assert_eq!(layer, ConfigLayer::default());
    }

    #[test]
    fn malformed_file_is_empty_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bobai.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(load_layer(&path), ConfigLayer::default());
    }

    #[test]
    fn valid_file_loads_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bobai.json");
        std::fs::write(&path, r#"{"provider":"openai","model":"gpt-4o"}"#).unwrap();
        let layer = load_layer(&path);
        assert_eq!(layer.provider.as_deref(), Some("openai"));
        assert_eq!(layer.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        // The project file also carries the project id; the layer ignores it.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bobai.json");
        std::fs::write(&path, r#"{"id":"abc","model":"gpt-4o"}"#).unwrap();
        let layer = load_layer(&path);
        assert_eq!(layer.model.as_deref(), Some("gpt-4o"));
        assert!(layer.provider.is_none());
    }
}
