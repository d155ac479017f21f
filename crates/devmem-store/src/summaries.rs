use chrono::{DateTime, Utc};
use devmem_core::DevmemResult;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::database::{parse_timestamp, Database};

const DEFAULT_RECENT_LIMIT: usize = 10;

/// A summary written when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Row id assigned on insert.
    pub id: i64,
    /// Session the summary was written for.
    pub session_id: String,
    /// Summary body.
    pub text: String,
    /// Insert time.
    pub created_at: DateTime<Utc>,
}

impl Database {
    /// Store a summary for an existing session and return its id.
    pub fn insert_summary(&self, session_id: &str, text: &str) -> DevmemResult<i64> {
        self.with_conn("insert summary", |conn| {
            conn.execute(
                "INSERT INTO summaries (session_id, text) VALUES (?1, ?2)",
                params![session_id, text],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Newest summaries first. Zero means the default of 10.
    pub fn recent_summaries(&self, limit: usize) -> DevmemResult<Vec<Summary>> {
        let limit = if limit == 0 { DEFAULT_RECENT_LIMIT } else { limit };
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn("recent summaries", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, text, created_at FROM summaries
                 ORDER BY created_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit], |row| {
                let created_at: String = row.get(3)?;
                Ok(Summary {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    text: row.get(2)?,
                    created_at: parse_timestamp(3, &created_at)?,
                })
            })?;
            rows.collect()
        })
    }
}
