// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! WebSocket bridge — one inbound `prompt` frame runs one turn; the turn's
//! outbound frames are written back on the same socket in emission order.
//!
//! Frames are JSON text messages, comfortable for browsers.  Turns on one
//! connection run sequentially; concurrency comes from multiple
//! connections, which coordinate only through the session store.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tracing::{debug, info, warn};

use bobai_core::{handle_prompt, ClientFrame, ClientSink, TurnDeps};

use crate::protocol::{parse_command, ClientCommand};
use crate::server::NodeState;

/// HTTP handler for GET /ws.
pub async fn ws_handler(ws: WebSocketUpgrade, State(node): State<Arc<NodeState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, node))
}

pub async fn handle_socket(mut socket: WebSocket, node: Arc<NodeState>) {
    info!("client connected");

    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Text(text)) => match parse_command(&text) {
                Ok(ClientCommand::Prompt { text, session_id }) => {
                    let deps = TurnDeps::new(
                        &node.store,
                        node.provider.as_ref(),
                        &node.model,
                        &node.project_root,
                    );
                    let mut sink = WsSink {
                        socket: &mut socket,
                    };
                    if let Err(e) =
                        handle_prompt(&deps, &text, session_id.as_deref(), &mut sink).await
                    {
                        // Store-level failure: the turn could not even record
                        // its state.  Tell the client and keep the connection.
                        warn!(error = %e, "turn failed before completion");
                        send_frame(
                            &mut socket,
                            &ClientFrame::Error {
                                message: format!("internal error: {e}"),
                            },
                        )
                        .await;
                    }
                }
                Err(description) => {
                    send_frame(
                        &mut socket,
                        &ClientFrame::Error {
                            message: description,
                        },
                    )
                    .await;
                }
            },
            Ok(Message::Ping(data)) => {
                if socket.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {} // binary frames ignored
        }
    }

    info!("client disconnected");
}

async fn send_frame(socket: &mut WebSocket, frame: &ClientFrame) {
    if let Ok(json) = serde_json::to_string(frame) {
        let _ = socket.send(Message::Text(json)).await;
    }
}

/// Adapts the turn handler's frame sink onto the WebSocket.
struct WsSink<'a> {
    socket: &'a mut WebSocket,
}

#[async_trait]
impl ClientSink for WsSink<'_> {
    async fn emit(&mut self, frame: ClientFrame) -> anyhow::Result<()> {
        let json = serde_json::to_string(&frame)?;
        debug!(frame = %json, "outbound frame");
        self.socket.send(Message::Text(json)).await?;
        Ok(())
    }
}
