use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use devmem_core::{DevmemError, DevmemResult};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, Transaction};
use tracing::{debug, info};

use crate::migrations;

/// Layout SQLite's `datetime('now')` produces. Stored timestamps must use it
/// so that string comparisons against `datetime('now', ...)` stay correct.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A migrated SQLite database.
///
/// A single connection is shared behind a mutex; every public method locks it
/// for the duration of one statement or transaction.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file at `path` and run pending migrations.
    ///
    /// The parent directory is created if missing. File databases use WAL
    /// journaling and a 5 second busy timeout.
    pub fn open(path: impl AsRef<Path>) -> DevmemResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(storage_err("open database"))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(storage_err("enable WAL"))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(storage_err("set busy timeout"))?;

        info!(path = %path.display(), "Opened observation database");
        Self::init(conn)
    }

    /// Create a private in-memory database. Used by tests.
    pub fn open_in_memory() -> DevmemResult<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err("open in-memory database"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> DevmemResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(storage_err("enable foreign keys"))?;
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` against the connection, mapping any SQLite error to
    /// [`DevmemError::Storage`] prefixed with `op`.
    pub fn with_conn<T>(
        &self,
        op: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> DevmemResult<T> {
        let conn = self.conn.lock();
        f(&conn).map_err(storage_err(op))
    }

    /// Run `f` inside a single transaction.
    ///
    /// The transaction commits only if `f` succeeds; on any error it is rolled
    /// back and nothing `f` wrote is visible.
    pub fn transaction<T>(
        &self,
        op: &str,
        f: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> DevmemResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage_err(op))?;
        let value = f(&tx).map_err(storage_err(op))?;
        tx.commit().map_err(storage_err(op))?;
        Ok(value)
    }

    /// Reclaim free pages left behind by deletes.
    pub fn vacuum(&self) -> DevmemResult<()> {
        self.with_conn("vacuum", |conn| conn.execute_batch("VACUUM"))?;
        debug!("Database vacuumed");
        Ok(())
    }
}

/// Build a mapper from `rusqlite::Error` to a contextualised storage error.
pub(crate) fn storage_err(op: &str) -> impl Fn(rusqlite::Error) -> DevmemError + '_ {
    move |e| DevmemError::Storage(format!("{op}: {e}"))
}

/// Render a timestamp the way SQLite's `datetime()` does.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a `datetime()` column at index `idx`.
pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse a JSON metadata column, keeping unparseable text as a JSON string.
pub(crate) fn parse_metadata(raw: String) -> serde_json::Value {
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(_) => serde_json::Value::String(raw),
    }
}
