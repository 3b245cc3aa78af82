// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Durable, ordered conversation history.
//!
//! One SQLite file per project (`.bobai/bobai.db`).  Sessions own an ordered
//! list of immutable messages; the only mutation is appending, and every
//! append runs in one transaction that claims the next sort order and bumps
//! the session's `updated_at`.  Transactions are what serialize concurrent
//! appends to the same session.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    fn parse(s: &str) -> Role {
        match s {
            "system" => Role::System,
            "user" => Role::User,
            "tool" => Role::Tool,
            _ => Role::Assistant,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: String,
    pub sort_order: i64,
    /// Assistant rows carry `{"tool_calls": […]}`; tool rows carry
    /// `{"tool_call_id": "…"}`.  Plain text rows have no metadata.
    pub metadata: Option<Value>,
}

pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// An in-memory store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                 id         TEXT PRIMARY KEY,
                 title      TEXT,
                 created_at TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS messages (
                 id         TEXT PRIMARY KEY,
                 session_id TEXT NOT NULL REFERENCES sessions(id),
                 role       TEXT NOT NULL,
                 content    TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 sort_order INTEGER NOT NULL,
                 metadata   TEXT
             );
             CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_session_order
                 ON messages(session_id, sort_order);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a session and its seed system message (sort order 0) in one
    /// transaction.  Returns the new session id.
    pub async fn create_session(&self, system_prompt: &str) -> Result<String, StoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO sessions (id, title, created_at, updated_at) VALUES (?1, NULL, ?2, ?2)",
            params![session_id, now],
        )?;
        tx.execute(
            "INSERT INTO messages (id, session_id, role, content, created_at, sort_order, metadata)
             VALUES (?1, ?2, 'system', ?3, ?4, 0, NULL)",
            params![Uuid::new_v4().to_string(), session_id, system_prompt, now],
        )?;
        tx.commit()?;
        debug!(session = %session_id, "created session");
        Ok(session_id)
    }

    /// Append one message: claim `max(sort_order) + 1`, insert, and bump the
    /// session's `updated_at`, all in one transaction.  Returns the assigned
    /// sort order.
    pub async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: Option<&Value>,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM sessions WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }

        let sort_order: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        let now = Utc::now().to_rfc3339();
        let metadata_text = metadata.map(serde_json::to_string).transpose()?;
        tx.execute(
            "INSERT INTO messages (id, session_id, role, content, created_at, sort_order, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Uuid::new_v4().to_string(),
                session_id,
                role.as_str(),
                content,
                now,
                sort_order,
                metadata_text,
            ],
        )?;
        tx.execute(
            "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
            params![now, session_id],
        )?;
        tx.commit()?;
        Ok(sort_order)
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<SessionRow>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT id, title, created_at, updated_at FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// All sessions, most recently updated first; ties break newest-insert
    /// first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRow>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, updated_at FROM sessions
             ORDER BY updated_at DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SessionRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// A session's messages in ascending sort order.
    pub async fn get_messages(&self, session_id: &str) -> Result<Vec<MessageRow>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, created_at, sort_order, metadata
             FROM messages WHERE session_id = ?1 ORDER BY sort_order ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                let role: String = row.get(2)?;
                let metadata: Option<String> = row.get(6)?;
                Ok((
                    MessageRow {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        role: Role::parse(&role),
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                        sort_order: row.get(5)?,
                        metadata: None,
                    },
                    metadata,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut msg, metadata)| {
                msg.metadata = metadata.as_deref().map(serde_json::from_str).transpose()?;
                Ok(msg)
            })
            .collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
