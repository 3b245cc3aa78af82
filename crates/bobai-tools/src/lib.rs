// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod context;
pub mod registry;
pub mod tool;

pub use context::ExecContext;
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{Tool, ToolOutput};

pub use builtin::bash::BashTool;
pub use builtin::edit_file::EditFileTool;
pub use builtin::grep_search::GrepSearchTool;
pub use builtin::list_directory::ListDirectoryTool;
pub use builtin::read_file::ReadFileTool;
pub use builtin::write_file::WriteFileTool;
