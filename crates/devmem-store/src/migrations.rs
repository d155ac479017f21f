use devmem_core::DevmemResult;
use rusqlite::Connection;
use tracing::debug;

use crate::database::storage_err;

/// Ordered schema statements. Each entry runs exactly once and its index is
/// recorded in `schema_migrations`. Append new entries; never edit old ones.
const MIGRATIONS: &[&str] = &[
    // 0: schema versioning
    "CREATE TABLE IF NOT EXISTS schema_migrations (
        version INTEGER PRIMARY KEY,
        applied_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
    // 1: observations
    "CREATE TABLE IF NOT EXISTS observations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        type TEXT NOT NULL DEFAULT 'discovery',
        title TEXT NOT NULL DEFAULT '',
        text TEXT NOT NULL,
        project TEXT NOT NULL DEFAULT '',
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
    // 2: keyword index over title + text
    "CREATE VIRTUAL TABLE IF NOT EXISTS observations_fts USING fts5(
        title,
        text,
        content=observations,
        content_rowid=id,
        tokenize='porter unicode61'
    )",
    // 3-5: keep the keyword index in sync
    "CREATE TRIGGER IF NOT EXISTS observations_ai AFTER INSERT ON observations BEGIN
        INSERT INTO observations_fts(rowid, title, text) VALUES (new.id, new.title, new.text);
    END",
    "CREATE TRIGGER IF NOT EXISTS observations_ad AFTER DELETE ON observations BEGIN
        INSERT INTO observations_fts(observations_fts, rowid, title, text)
        VALUES ('delete', old.id, old.title, old.text);
    END",
    "CREATE TRIGGER IF NOT EXISTS observations_au AFTER UPDATE ON observations BEGIN
        INSERT INTO observations_fts(observations_fts, rowid, title, text)
        VALUES ('delete', old.id, old.title, old.text);
        INSERT INTO observations_fts(rowid, title, text) VALUES (new.id, new.title, new.text);
    END",
    // 6: sessions
    "CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        project TEXT NOT NULL DEFAULT '',
        started_at TEXT NOT NULL DEFAULT (datetime('now')),
        ended_at TEXT,
        message_count INTEGER NOT NULL DEFAULT 0,
        metadata TEXT NOT NULL DEFAULT '{}'
    )",
    // 7: summaries
    "CREATE TABLE IF NOT EXISTS summaries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY (session_id) REFERENCES sessions(id)
    )",
    // 8: vector embeddings, one blob per observation
    "CREATE TABLE IF NOT EXISTS observation_embeddings (
        observation_id INTEGER PRIMARY KEY,
        embedding BLOB NOT NULL,
        FOREIGN KEY (observation_id) REFERENCES observations(id) ON DELETE CASCADE
    )",
    // 9-13: indexes
    "CREATE INDEX IF NOT EXISTS idx_observations_session ON observations(session_id)",
    "CREATE INDEX IF NOT EXISTS idx_observations_type ON observations(type)",
    "CREATE INDEX IF NOT EXISTS idx_observations_project ON observations(project)",
    "CREATE INDEX IF NOT EXISTS idx_observations_created ON observations(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_summaries_session ON summaries(session_id)",
];

/// Apply every migration newer than the recorded schema version.
pub(crate) fn migrate(conn: &Connection) -> DevmemResult<()> {
    conn.execute_batch(MIGRATIONS[0])
        .map_err(storage_err("create schema_migrations table"))?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), -1) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(storage_err("read migration version"))?;

    let pending = usize::try_from(current + 1).unwrap_or(0);
    for (version, sql) in MIGRATIONS.iter().enumerate().skip(pending) {
        debug!(version, "Running migration");
        let tx = conn
            .unchecked_transaction()
            .map_err(storage_err("begin migration"))?;
        tx.execute_batch(sql)
            .map_err(|e| devmem_core::DevmemError::Storage(format!("migration {version}: {e}")))?;
        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version as i64],
        )
        .map_err(storage_err("record migration"))?;
        tx.commit().map_err(storage_err("commit migration"))?;
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn applied_versions(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn test_migrate_records_every_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(applied_versions(&conn), MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(applied_versions(&conn), MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_fts_trigger_indexes_inserts() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO observations (session_id, title, text) VALUES ('s1', 'auth', 'token refresh')",
            [],
        )
        .unwrap();

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM observations_fts WHERE observations_fts MATCH 'refresh'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
    }
}
