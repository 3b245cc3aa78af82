// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::ConfigLayer;

/// Well-known locations inside a project's `.bobai` directory.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    /// `<root>/.bobai`
    pub dir: PathBuf,
    /// `<root>/.bobai/bobai.json`
    pub config_file: PathBuf,
    /// `<root>/.bobai/bobai.db`
    pub db_file: PathBuf,
}

pub fn project_paths(root: &Path) -> ProjectPaths {
    let dir = root.join(".bobai");
    ProjectPaths {
        root: root.to_path_buf(),
        config_file: dir.join("bobai.json"),
        db_file: dir.join("bobai.db"),
        dir,
    }
}

/// Contents of `<project>/.bobai/bobai.json`.
///
/// Besides the project id, the file may carry the same `provider` / `model`
/// overrides as the global preferences file; they form the highest-priority
/// configuration layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    pub id: String,
    #[serde(flatten)]
    pub overrides: ConfigLayer,
}

/// Ensure `<root>/.bobai/bobai.json` exists, assigning a fresh project id on
/// first use.  An existing file is read back unchanged.
pub fn ensure_project(root: &Path) -> anyhow::Result<ProjectFile> {
    let paths = project_paths(root);
    std::fs::create_dir_all(&paths.dir)
        .with_context(|| format!("creating {}", paths.dir.display()))?;

    if paths.config_file.is_file() {
        let text = std::fs::read_to_string(&paths.config_file)
            .with_context(|| format!("reading {}", paths.config_file.display()))?;
        if let Ok(file) = serde_json::from_str::<ProjectFile>(&text) {
            return Ok(file);
        }
        // Malformed project file: keep the user's overrides out of it and
        // regenerate with a fresh id rather than failing startup.
        info!(path = %paths.config_file.display(), "regenerating malformed project file");
    }

    let file = ProjectFile {
        id: Uuid::new_v4().to_string(),
        overrides: ConfigLayer::default(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(&paths.config_file, json)
        .with_context(|| format!("writing {}", paths.config_file.display()))?;
    info!(project = %file.id, root = %root.display(), "initialized project");
    Ok(file)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
