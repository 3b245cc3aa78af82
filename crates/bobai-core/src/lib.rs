// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod agent;
mod events;
mod prompts;
mod turn;

pub use agent::{
    AgentLoop, LoopOutcome, MessageSink, TurnMessage, DEFAULT_MAX_ITERATIONS,
};
pub use events::AgentEvent;
pub use prompts::system_prompt;
pub use turn::{handle_prompt, project_history, ClientFrame, ClientSink, TurnDeps};
