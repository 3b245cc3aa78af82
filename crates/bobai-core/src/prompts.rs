// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

/// The system prompt every new session is seeded with.
pub fn system_prompt(project_root: &Path) -> String {
    format!(
        "You are bobai, a coding assistant working inside the project at {root}.\n\
         \n\
         You can inspect and change the project with the provided tools: \
         read_file, list_directory, grep_search, write_file, edit_file, and \
         bash. All paths are relative to the project root and must stay \
         inside it.\n\
         \n\
         Work in small steps: look before you edit, prefer edit_file for \
         targeted changes, and verify with bash when the project has a build \
         or test command. When a tool reports an error, read the message and \
         correct your next call instead of repeating it. Answer in plain \
         text once the task is done.",
        root = project_root.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_project_root_and_tools() {
        let p = system_prompt(Path::new("/work/demo"));
        assert!(p.contains("/work/demo"));
        for tool in ["read_file", "list_directory", "grep_search", "write_file", "edit_file", "bash"] {
            assert!(p.contains(tool), "prompt must name {tool}");
        }
    }
}
