use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::config::Config;

/// Lifecycle of a research session. `InProgress` is the only non-terminal
/// state; once a session is `Completed` or `Failed` it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    InProgress,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown session status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for SessionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// One persisted pipeline run. `id` is the storage primary key; `session_id`
/// is the external correlation key and is never reused.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchSession {
    pub id: i64,
    pub session_id: String,
    pub query: String,
    pub research_output: String,
    pub summary_output: String,
    pub critique_output: String,
    pub status: SessionStatus,
    pub created_at: i64,
}

/// Partial update applied to an existing session row. Unset fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub research_output: Option<String>,
    pub summary_output: Option<String>,
    pub critique_output: Option<String>,
    pub status: Option<SessionStatus>,
}

/// Keyed durable storage for research sessions. A fresh connection is opened
/// per operation, so concurrent runs writing distinct sessions never share
/// mutable state.
#[derive(Debug, Clone)]
pub struct SessionStore {
    db_path: PathBuf,
}

impl SessionStore {
    pub fn new(db_path: PathBuf) -> Self {
        SessionStore { db_path }
    }

    pub fn default_path() -> PathBuf {
        Config::get_config_dir().join("sessions.sqlite")
    }

    fn connect(&self) -> anyhow::Result<Connection> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS research_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL UNIQUE,
                query TEXT NOT NULL,
                research_output TEXT NOT NULL DEFAULT '',
                summary_output TEXT NOT NULL DEFAULT '',
                critique_output TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(conn)
    }

    /// Verify the store is reachable and the schema exists.
    pub fn init(&self) -> anyhow::Result<()> {
        self.connect().map(|_| ())
    }

    /// Insert a new in-progress session with empty outputs. `created_at` is
    /// assigned here. Returns the storage row id.
    pub fn insert(&self, session_id: &str, query: &str) -> anyhow::Result<i64> {
        let conn = self.connect()?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        conn.execute(
            "INSERT INTO research_sessions (session_id, query, status, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, query, SessionStatus::InProgress.as_str(), now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update(&self, session_id: &str, update: &SessionUpdate) -> anyhow::Result<()> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(v) = &update.research_output {
            sets.push("research_output = ?");
            values.push(Box::new(v.clone()));
        }
        if let Some(v) = &update.summary_output {
            sets.push("summary_output = ?");
            values.push(Box::new(v.clone()));
        }
        if let Some(v) = &update.critique_output {
            sets.push("critique_output = ?");
            values.push(Box::new(v.clone()));
        }
        if let Some(v) = &update.status {
            sets.push("status = ?");
            values.push(Box::new(v.as_str().to_string()));
        }

        if sets.is_empty() {
            return Ok(());
        }
        values.push(Box::new(session_id.to_string()));

        let conn = self.connect()?;
        let sql = format!(
            "UPDATE research_sessions SET {} WHERE session_id = ?",
            sets.join(", ")
        );
        conn.execute(
            &sql,
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        )?;
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> anyhow::Result<Option<ResearchSession>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, query, research_output, summary_output,
                    critique_output, status, created_at
             FROM research_sessions WHERE session_id = ?1",
        )?;
        let mut rows = stmt.query([session_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_session(row)?)),
            None => Ok(None),
        }
    }

    /// Most recent sessions first.
    pub fn list(&self, limit: usize) -> anyhow::Result<Vec<ResearchSession>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, query, research_output, summary_output,
                    critique_output, status, created_at
             FROM research_sessions
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], row_to_session)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    pub fn delete(&self, session_id: &str) -> anyhow::Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM research_sessions WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(())
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResearchSession> {
    let status_text: String = row.get(6)?;
    let status = status_text.parse::<SessionStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ResearchSession {
        id: row.get(0)?,
        session_id: row.get(1)?,
        query: row.get(2)?,
        research_output: row.get(3)?,
        summary_output: row.get(4)?,
        critique_output: row.get(5)?,
        status,
        created_at: row.get(7)?,
    })
}
