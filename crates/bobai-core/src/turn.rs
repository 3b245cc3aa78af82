// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! One end-to-end prompt: resolve or create the session, append the user
//! turn, project the stored history into provider messages, drive the agent
//! loop, persist everything it produces, and map its events onto outbound
//! client frames.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bobai_model::{ChatMessage, ChatProvider, ProviderError, ToolCallRecord};
use bobai_store::{MessageRow, Role, SessionStore};
use bobai_tools::{ExecContext, ToolRegistry};

use crate::agent::{AgentLoop, LoopOutcome, MessageSink, TurnMessage, DEFAULT_MAX_ITERATIONS};
use crate::events::AgentEvent;
use crate::prompts;

/// One outbound frame to the client.  Serialized shape is wire contract:
/// `{"type":"token","text":…}`, `{"type":"done","sessionId":…,"model":…}`,
/// and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Token {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        id: String,
        name: String,
        output: String,
        #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
        is_error: bool,
    },
    Done {
        #[serde(rename = "sessionId")]
        session_id: String,
        model: String,
    },
    Error {
        message: String,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Where outbound frames go.  The transport adapter implements this over
/// its connection; tests record frames in memory.
#[async_trait]
pub trait ClientSink: Send {
    async fn emit(&mut self, frame: ClientFrame) -> anyhow::Result<()>;
}

/// Everything one turn needs.
pub struct TurnDeps<'a> {
    pub store: &'a SessionStore,
    pub provider: &'a dyn ChatProvider,
    pub model: &'a str,
    pub project_root: &'a Path,
    pub max_iterations: u32,
    pub cancel: CancellationToken,
}

impl<'a> TurnDeps<'a> {
    pub fn new(
        store: &'a SessionStore,
        provider: &'a dyn ChatProvider,
        model: &'a str,
        project_root: &'a Path,
    ) -> Self {
        Self {
            store,
            provider,
            model,
            project_root,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            cancel: CancellationToken::new(),
        }
    }
}

/// Handle one prompt from the client.
///
/// Failure policy: everything below the transport is folded back into the
/// conversation.  A provider failure is persisted as an assistant message
/// (so a resumed session carries it as context), surfaced as an `error`
/// frame, and still followed by `done` so the client learns the session id
/// and can resume.  Only cancellation ends the turn without `done`.
pub async fn handle_prompt(
    deps: &TurnDeps<'_>,
    text: &str,
    session_id: Option<&str>,
    sink: &mut dyn ClientSink,
) -> anyhow::Result<()> {
    let session_id = match session_id {
        Some(id) => match deps.store.get_session(id).await? {
            Some(row) => row.id,
            None => {
                emit(sink, ClientFrame::Error {
                    message: format!("Session not found: {id}"),
                })
                .await;
                return Ok(());
            }
        },
        None => {
            deps.store
                .create_session(&prompts::system_prompt(deps.project_root))
                .await?
        }
    };
    info!(session = %session_id, "handling prompt");

    deps.store
        .append_message(&session_id, Role::User, text, None)
        .await?;
    let rows = deps.store.get_messages(&session_id).await?;
    let history = project_history(&rows);

    let tools = ToolRegistry::builtin();
    let ctx = ExecContext::new(deps.project_root)?;
    let agent = AgentLoop::new(deps.provider, deps.model, &tools, &ctx)
        .with_max_iterations(deps.max_iterations)
        .with_cancel(deps.cancel.clone());

    let (tx, mut rx) = mpsc::channel::<AgentEvent>(64);
    let mut store_sink = StoreSink {
        store: deps.store,
        session_id: session_id.clone(),
    };

    let loop_fut = agent.run(history, tx, &mut store_sink);
    let forward_fut = async {
        while let Some(event) = rx.recv().await {
            let frame = match event {
                AgentEvent::TextDelta(text) => ClientFrame::Token { text },
                AgentEvent::ToolCall { id, name, arguments } => ClientFrame::ToolCall {
                    id,
                    name,
                    arguments,
                },
                AgentEvent::ToolResult {
                    id,
                    name,
                    output,
                    is_error,
                } => ClientFrame::ToolResult {
                    id,
                    name,
                    output,
                    is_error,
                },
            };
            emit(sink, frame).await;
        }
    };
    let (loop_res, ()) = tokio::join!(loop_fut, forward_fut);

    match loop_res {
        Ok(LoopOutcome::Completed) => {
            emit(sink, ClientFrame::Done {
                session_id,
                model: deps.model.to_string(),
            })
            .await;
        }
        Ok(LoopOutcome::Canceled) => {
            info!(session = %session_id, "turn canceled");
        }
        Err(e) => {
            if matches!(e.downcast_ref::<ProviderError>(), Some(ProviderError::Canceled)) {
                info!(session = %session_id, "turn canceled");
                return Ok(());
            }
            let message = e.to_string();
            warn!(session = %session_id, error = %message, "turn failed");
            deps.store
                .append_message(
                    &session_id,
                    Role::Assistant,
                    &format!("[Error: {message}]"),
                    None,
                )
                .await?;
            emit(sink, ClientFrame::Error {
                message: message.clone(),
            })
            .await;
            emit(sink, ClientFrame::Done {
                session_id,
                model: deps.model.to_string(),
            })
            .await;
        }
    }

    Ok(())
}

/// A sink failure means the client went away; the turn keeps running so the
/// session stays consistent, it just stops being observed.
async fn emit(sink: &mut dyn ClientSink, frame: ClientFrame) {
    if let Err(e) = sink.emit(frame).await {
        warn!(error = %e, "client sink rejected frame");
    }
}

/// Project stored rows into the provider's message shape.  Assistant rows
/// with tool-call metadata become `tool_calls` arrays; tool rows keep their
/// `tool_call_id`.  A session whose last assistant message has unanswered
/// tool calls is projected as-is.
pub fn project_history(rows: &[MessageRow]) -> Vec<ChatMessage> {
    rows.iter()
        .map(|row| match row.role {
            Role::System => ChatMessage::system(&row.content),
            Role::User => ChatMessage::user(&row.content),
            Role::Assistant => {
                let calls = row
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("tool_calls"))
                    .and_then(|v| {
                        serde_json::from_value::<Vec<ToolCallRecord>>(v.clone()).ok()
                    })
                    .unwrap_or_default();
                if calls.is_empty() {
                    ChatMessage::assistant(&row.content)
                } else {
                    ChatMessage::assistant_with_calls(&row.content, calls)
                }
            }
            Role::Tool => {
                let call_id = row
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("tool_call_id"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                ChatMessage::tool_result(call_id, &row.content)
            }
        })
        .collect()
}

struct StoreSink<'a> {
    store: &'a SessionStore,
    session_id: String,
}

#[async_trait]
impl MessageSink for StoreSink<'_> {
    async fn persist(&mut self, msg: &TurnMessage) -> anyhow::Result<()> {
        self.store
            .append_message(&self.session_id, msg.role, &msg.content, msg.metadata.as_ref())
            .await?;
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use bobai_model::{FinishReason, Script, ScriptedProvider, StreamEvent};

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<ClientFrame>,
    }

    #[async_trait]
    impl ClientSink for RecordingSink {
        async fn emit(&mut self, frame: ClientFrame) -> anyhow::Result<()> {
            self.frames.push(frame);
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: SessionStore,
        root: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        Fixture {
            _dir: dir,
            store: SessionStore::in_memory().unwrap(),
            root,
        }
    }

    fn frame_kinds(frames: &[ClientFrame]) -> Vec<&'static str> {
        frames
            .iter()
            .map(|f| match f {
                ClientFrame::Token { .. } => "token",
                ClientFrame::ToolCall { .. } => "tool_call",
                ClientFrame::ToolResult { .. } => "tool_result",
                ClientFrame::Done { .. } => "done",
                ClientFrame::Error { .. } => "error",
            })
            .collect()
    }

    // ── Plain text turn ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn plain_turn_creates_session_streams_tokens_and_persists() {
        let fx = fixture();
        let provider = ScriptedProvider::new(vec![Script::Events(vec![
            StreamEvent::TextDelta("Hello".into()),
            StreamEvent::TextDelta(" world".into()),
            StreamEvent::Finish(FinishReason::Stop),
        ])]);
        let deps = TurnDeps::new(&fx.store, &provider, "gpt-4o", &fx.root);
        let mut sink = RecordingSink::default();

        handle_prompt(&deps, "hi", None, &mut sink).await.unwrap();

        assert_eq!(frame_kinds(&sink.frames), vec!["token", "token", "done"]);
        let session_id = match sink.frames.last().unwrap() {
            ClientFrame::Done { session_id, model } => {
                assert_eq!(model, "gpt-4o");
                session_id.clone()
            }
            other => panic!("expected done, got {other:?}"),
        };

        let rows = fx.store.get_messages(&session_id).await.unwrap();
        let roles: Vec<Role> = rows.iter().map(|r| r.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(rows[1].content, "hi");
        assert_eq!(rows[2].content, "Hello world");
    }

    // ── Session resolution ────────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_session_id_emits_error_and_persists_nothing() {
        let fx = fixture();
        let provider = ScriptedProvider::always_text("unused");
        let deps = TurnDeps::new(&fx.store, &provider, "m", &fx.root);
        let mut sink = RecordingSink::default();

        handle_prompt(&deps, "hi", Some("ghost"), &mut sink)
            .await
            .unwrap();

        assert_eq!(sink.frames.len(), 1);
        assert!(matches!(&sink.frames[0], ClientFrame::Error { message }
            if message == "Session not found: ghost"));
        assert_eq!(provider.call_count(), 0);
        assert!(fx.store.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn existing_session_accumulates_turns() {
        let fx = fixture();
        let provider = ScriptedProvider::new(vec![
            Script::Events(vec![
                StreamEvent::TextDelta("first".into()),
                StreamEvent::Finish(FinishReason::Stop),
            ]),
            Script::Events(vec![
                StreamEvent::TextDelta("second".into()),
                StreamEvent::Finish(FinishReason::Stop),
            ]),
        ]);
        let deps = TurnDeps::new(&fx.store, &provider, "m", &fx.root);

        let mut sink = RecordingSink::default();
        handle_prompt(&deps, "one", None, &mut sink).await.unwrap();
        let session_id = match sink.frames.last().unwrap() {
            ClientFrame::Done { session_id, .. } => session_id.clone(),
            other => panic!("expected done, got {other:?}"),
        };

        let mut sink2 = RecordingSink::default();
        handle_prompt(&deps, "two", Some(&session_id), &mut sink2)
            .await
            .unwrap();

        // system, user, assistant, user, assistant
        let rows = fx.store.get_messages(&session_id).await.unwrap();
        assert_eq!(rows.len(), 5);

        // The second provider call saw the whole history.
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[1].messages.len(), 4, "system, user, assistant, user");
    }

    // ── Provider failure ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn provider_error_is_persisted_then_error_and_done() {
        let fx = fixture();
        let provider = ScriptedProvider::new(vec![Script::Status {
            status: 500,
            body: "upstream exploded".into(),
        }]);
        let deps = TurnDeps::new(&fx.store, &provider, "m", &fx.root);
        let mut sink = RecordingSink::default();

        handle_prompt(&deps, "q", None, &mut sink).await.unwrap();

        assert_eq!(frame_kinds(&sink.frames), vec!["error", "done"]);
        assert!(matches!(&sink.frames[0], ClientFrame::Error { message }
            if message == "Provider error (500): upstream exploded"));

        let session_id = match &sink.frames[1] {
            ClientFrame::Done { session_id, .. } => session_id.clone(),
            other => panic!("expected done, got {other:?}"),
        };
        let rows = fx.store.get_messages(&session_id).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].role, Role::Assistant);
        assert_eq!(
            rows[2].content,
            "[Error: Provider error (500): upstream exploded]"
        );
    }

    #[tokio::test]
    async fn resume_after_provider_error_includes_error_in_history() {
        let fx = fixture();
        let provider = ScriptedProvider::new(vec![
            Script::Status {
                status: 500,
                body: "boom".into(),
            },
            Script::Events(vec![
                StreamEvent::TextDelta("recovered".into()),
                StreamEvent::Finish(FinishReason::Stop),
            ]),
        ]);
        let deps = TurnDeps::new(&fx.store, &provider, "m", &fx.root);

        let mut sink = RecordingSink::default();
        handle_prompt(&deps, "q", None, &mut sink).await.unwrap();
        let session_id = match sink.frames.last().unwrap() {
            ClientFrame::Done { session_id, .. } => session_id.clone(),
            other => panic!("expected done, got {other:?}"),
        };

        let mut sink2 = RecordingSink::default();
        handle_prompt(&deps, "again", Some(&session_id), &mut sink2)
            .await
            .unwrap();
        assert_eq!(frame_kinds(&sink2.frames), vec!["token", "done"]);

        let requests = provider.requests.lock().unwrap();
        let resumed = &requests[1].messages;
        assert!(
            resumed.iter().any(|m| m
                .content
                .as_deref()
                .is_some_and(|c| c.starts_with("[Error: Provider error (500)"))),
            "resumed history must carry the persisted error message"
        );
    }

    // ── History projection ────────────────────────────────────────────────────

    #[tokio::test]
    async fn projection_restores_tool_calls_and_results() {
        let fx = fixture();
        let id = fx.store.create_session("sys").await.unwrap();
        fx.store
            .append_message(
                &id,
                Role::Assistant,
                "",
                Some(&json!({"tool_calls": [{"id": "c1", "name": "bash", "arguments": "{\"command\":\"ls\"}"}]})),
            )
            .await
            .unwrap();
        fx.store
            .append_message(&id, Role::Tool, "file.txt", Some(&json!({"tool_call_id": "c1"})))
            .await
            .unwrap();

        let rows = fx.store.get_messages(&id).await.unwrap();
        let history = project_history(&rows);

        assert_eq!(history.len(), 3);
        assert_eq!(history[1].tool_calls.len(), 1);
        assert_eq!(history[1].tool_calls[0].arguments, "{\"command\":\"ls\"}");
        assert!(history[1].content.is_none(), "empty content projects as null");
        assert_eq!(history[2].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn dangling_tool_calls_are_projected_as_is() {
        let fx = fixture();
        let id = fx.store.create_session("sys").await.unwrap();
        fx.store
            .append_message(
                &id,
                Role::Assistant,
                "",
                Some(&json!({"tool_calls": [{"id": "c9", "name": "bash", "arguments": "{}"}]})),
            )
            .await
            .unwrap();

        let rows = fx.store.get_messages(&id).await.unwrap();
        let history = project_history(&rows);
        assert_eq!(history.last().unwrap().tool_calls[0].id, "c9");
    }

    // ── Wire shape ────────────────────────────────────────────────────────────

    #[test]
    fn frames_serialize_to_the_wire_contract() {
        let token = serde_json::to_value(ClientFrame::Token { text: "hi".into() }).unwrap();
        assert_eq!(token, json!({"type": "token", "text": "hi"}));

        let done = serde_json::to_value(ClientFrame::Done {
            session_id: "s1".into(),
            model: "gpt-4o".into(),
        })
        .unwrap();
        assert_eq!(done, json!({"type": "done", "sessionId": "s1", "model": "gpt-4o"}));

        let result = serde_json::to_value(ClientFrame::ToolResult {
            id: "c1".into(),
            name: "bash".into(),
            output: "ok".into(),
            is_error: false,
        })
        .unwrap();
        assert_eq!(
            result,
            json!({"type": "tool_result", "id": "c1", "name": "bash", "output": "ok"}),
            "isError is omitted when false"
        );

        let err_result = serde_json::to_value(ClientFrame::ToolResult {
            id: "c1".into(),
            name: "bash".into(),
            output: "bad".into(),
            is_error: true,
        })
        .unwrap();
        assert_eq!(err_result["isError"], json!(true));
    }
}
