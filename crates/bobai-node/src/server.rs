// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::info;

use bobai_model::ChatProvider;
use bobai_store::SessionStore;

/// Everything the node shares across connections.  The store serializes its
/// own access; the provider and registry are immutable.
pub struct NodeState {
    pub store: SessionStore,
    pub provider: Box<dyn ChatProvider>,
    pub model: String,
    pub project_root: PathBuf,
}

pub fn router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/ws", get(crate::ws::ws_handler))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<NodeState>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, model = %state.model, root = %state.project_root.display(), "bobai listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
