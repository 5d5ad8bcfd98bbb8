//! Per-user conversation state storage
//!
//! `SessionStore` is the only state the flow engine depends on between
//! messages. Two backends: SQLite (survives restarts) and in-memory.

use std::sync::Arc;

use dashmap::DashMap;
use rusqlite::{params, OptionalExtension};

use crate::core::error::AppResult;
use crate::flow::{FlowData, SessionData};
use crate::storage::db::{get_connection, DbPool};

/// Load/save a user's conversation state.
pub trait SessionStore: Send + Sync {
    /// Returns the empty default when the user has no stored session.
    fn get(&self, user_id: i64) -> AppResult<SessionData>;

    fn set(&self, user_id: i64, session: &SessionData) -> AppResult<()>;
}

/// Sessions kept in the `sessions` table, one row per user.
pub struct SqliteSessionStore {
    pool: Arc<DbPool>,
}

impl SqliteSessionStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

impl SessionStore for SqliteSessionStore {
    fn get(&self, user_id: i64) -> AppResult<SessionData> {
        let conn = get_connection(&self.pool)?;
        let row: Option<(Option<String>, String)> = conn
            .query_row(
                "SELECT current_step, flow_data FROM sessions WHERE telegram_user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((current_step, flow_data)) => Ok(SessionData {
                current_step,
                flow_data: serde_json::from_str::<FlowData>(&flow_data)?,
            }),
            None => Ok(SessionData::default()),
        }
    }

    fn set(&self, user_id: i64, session: &SessionData) -> AppResult<()> {
        let conn = get_connection(&self.pool)?;

        // A cleared session is the same as no session
        if *session == SessionData::default() {
            conn.execute("DELETE FROM sessions WHERE telegram_user_id = ?1", params![user_id])?;
            return Ok(());
        }

        let flow_data = serde_json::to_string(&session.flow_data)?;
        conn.execute(
            "INSERT INTO sessions (telegram_user_id, current_step, flow_data, updated_at)
             VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
             ON CONFLICT(telegram_user_id) DO UPDATE SET
                current_step = excluded.current_step,
                flow_data = excluded.flow_data,
                updated_at = CURRENT_TIMESTAMP",
            params![user_id, session.current_step, flow_data],
        )?;
        Ok(())
    }
}

/// Sessions kept in process memory; lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<i64, SessionData>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a non-empty session.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, user_id: i64) -> AppResult<SessionData> {
        Ok(self
            .sessions
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn set(&self, user_id: i64, session: &SessionData) -> AppResult<()> {
        if *session == SessionData::default() {
            self.sessions.remove(&user_id);
        } else {
            self.sessions.insert(user_id, session.clone());
        }
        Ok(())
    }
}
