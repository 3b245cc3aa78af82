// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod protocol;
pub mod server;
pub mod ws;

pub use protocol::{parse_command, ClientCommand, ClientFrame};
pub use server::{router, serve, NodeState};
