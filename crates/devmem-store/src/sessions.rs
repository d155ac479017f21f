use chrono::{DateTime, Utc};
use devmem_core::DevmemResult;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::database::{format_timestamp, parse_metadata, parse_timestamp, Database};

const SESSION_COLUMNS: &str = "id, project, started_at, ended_at, message_count, metadata";

/// One coding session that observations are attributed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Client-supplied session id.
    pub id: String,
    /// Project the session works on.
    pub project: String,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// `None` while the session is active.
    pub ended_at: Option<DateTime<Utc>>,
    /// Messages exchanged so far.
    pub message_count: i64,
    /// Free-form JSON attached by the client.
    pub metadata: serde_json::Value,
}

impl Session {
    /// Whether the session has not been ended yet.
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// A session that has not been stored yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSession {
    /// Client-supplied session id; must be unique.
    pub id: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Explicit start time; the database clock is used when absent.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let started_at: String = row.get(2)?;
    let ended_at: Option<String> = row.get(3)?;
    let metadata: String = row.get(5)?;
    Ok(Session {
        id: row.get(0)?,
        project: row.get(1)?,
        started_at: parse_timestamp(2, &started_at)?,
        ended_at: ended_at
            .as_deref()
            .map(|raw| parse_timestamp(3, raw))
            .transpose()?,
        message_count: row.get(4)?,
        metadata: parse_metadata(metadata),
    })
}

impl Database {
    /// Store a new session record.
    pub fn insert_session(&self, session: &NewSession) -> DevmemResult<()> {
        let metadata = match &session.metadata {
            Some(value) => serde_json::to_string(value)?,
            None => "{}".to_string(),
        };
        let started_at = session.started_at.map(format_timestamp);
        self.with_conn("insert session", |conn| {
            conn.execute(
                "INSERT INTO sessions (id, project, metadata, started_at)
                 VALUES (?1, ?2, ?3, COALESCE(?4, datetime('now')))",
                params![session.id, session.project, metadata, started_at],
            )
        })?;
        Ok(())
    }

    /// Fetch a session by id.
    pub fn get_session(&self, id: &str) -> DevmemResult<Option<Session>> {
        self.with_conn("get session", |conn| {
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                [id],
                session_from_row,
            )
            .optional()
        })
    }

    /// Mark a session as ended now. Returns `false` if no such session exists.
    ///
    /// A session that has already ended keeps its original end time.
    pub fn end_session(&self, id: &str) -> DevmemResult<bool> {
        self.with_conn("end session", |conn| {
            let changed = conn.execute(
                "UPDATE sessions SET ended_at = datetime('now')
                 WHERE id = ?1 AND ended_at IS NULL",
                [id],
            )?;
            if changed > 0 {
                return Ok(true);
            }
            conn.query_row("SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1)", [id], |row| {
                row.get(0)
            })
        })
    }

    /// Bump the message counter. Returns `false` if no such session exists.
    pub fn increment_message_count(&self, id: &str) -> DevmemResult<bool> {
        let changed = self.with_conn("increment message count", |conn| {
            conn.execute(
                "UPDATE sessions SET message_count = message_count + 1 WHERE id = ?1",
                [id],
            )
        })?;
        Ok(changed > 0)
    }

    /// End every active session that started more than `max_age_hours` ago
    /// and return how many were closed.
    pub fn cleanup_stale_sessions(&self, max_age_hours: u32) -> DevmemResult<usize> {
        self.with_conn("cleanup stale sessions", |conn| {
            conn.execute(
                "UPDATE sessions SET ended_at = datetime('now')
                 WHERE ended_at IS NULL
                   AND started_at < datetime('now', ?1)",
                [format!("-{max_age_hours} hours")],
            )
        })
    }

    /// Sessions that have not ended, most recently started first.
    pub fn list_active_sessions(&self) -> DevmemResult<Vec<Session>> {
        self.with_conn("list active sessions", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE ended_at IS NULL ORDER BY started_at DESC, id"
            ))?;
            let rows = stmt.query_map([], session_from_row)?;
            rows.collect()
        })
    }
}
