// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wire protocol between the browser client and the node.
//!
//! Inbound: one frame kind, `{"type":"prompt","text":…,"sessionId"?:…}`.
//! Outbound frames are [`bobai_core::ClientFrame`]; each one is a single
//! self-contained JSON object written as one transport message.

use serde::{Deserialize, Serialize};

pub use bobai_core::ClientFrame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Prompt {
        text: String,
        #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
}

/// Parse one inbound frame.  Unparseable input and unknown frame kinds
/// produce a description for the single `error` response; they are never
/// acted on.
pub fn parse_command(text: &str) -> Result<ClientCommand, String> {
    serde_json::from_str(text).map_err(|e| format!("invalid client message: {e}"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_without_session_parses() {
        let cmd = parse_command(r#"{"type":"prompt","text":"hi"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Prompt {
                text: "hi".into(),
                session_id: None,
            }
        );
    }

    #[test]
    fn prompt_with_session_id_parses() {
        let cmd = parse_command(r#"{"type":"prompt","text":"hi","sessionId":"s-1"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Prompt {
                text: "hi".into(),
                session_id: Some("s-1".into()),
            }
        );
    }

    #[test]
    fn unknown_frame_kind_is_rejected() {
        let err = parse_command(r#"{"type":"subscribe"}"#).unwrap_err();
        assert!(err.contains("invalid client message"), "{err}");
    }

    #[test]
    fn non_json_is_rejected() {
        assert!(parse_command("hello there").is_err());
    }

    #[test]
    fn missing_text_field_is_rejected() {
        assert!(parse_command(r#"{"type":"prompt"}"#).is_err());
    }

    #[test]
    fn outbound_error_frame_round_trips() {
        let frame = ClientFrame::Error {
            message: "bad".into(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"bad"}"#);
    }
}
