use chrono::{DateTime, Utc};
use devmem_core::DevmemResult;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::database::{format_timestamp, parse_metadata, parse_timestamp, Database};

const DEFAULT_OBSERVATION_TYPE: &str = "discovery";
const DEFAULT_SEARCH_LIMIT: usize = 20;
const DEFAULT_RECENT_LIMIT: usize = 50;
const DEFAULT_TIMELINE_DEPTH: usize = 5;

const OBSERVATION_COLUMNS: &str =
    "o.id, o.session_id, o.type, o.title, o.text, o.project, o.metadata, o.created_at";

/// A single discovery, bugfix or decision recorded during a coding session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Row id assigned on insert.
    pub id: i64,
    /// Session that recorded it.
    pub session_id: String,
    /// Category tag (`discovery`, `bugfix`, `decision`, ...).
    #[serde(rename = "type")]
    pub obs_type: String,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub text: String,
    /// Project name; may be empty.
    pub project: String,
    /// Free-form JSON attached by the client.
    pub metadata: serde_json::Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// An observation that has not been stored yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewObservation {
    /// Session that recorded it.
    #[serde(default)]
    pub session_id: String,
    /// Empty means `discovery`.
    #[serde(default, rename = "type")]
    pub obs_type: String,
    /// Short headline.
    #[serde(default)]
    pub title: String,
    /// Body text; must not be empty.
    pub text: String,
    /// Project name.
    #[serde(default)]
    pub project: String,
    /// Free-form JSON; stored as `{}` when absent.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Explicit creation time; the database clock is used when absent.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Parameters for a filtered keyword search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Free text; every term must match.
    pub query: String,
    /// Exact type to match.
    pub obs_type: Option<String>,
    /// Exact project to match.
    pub project: Option<String>,
    /// Inclusive lower bound on `created_at` (`YYYY-MM-DD` or a full timestamp).
    pub date_start: Option<String>,
    /// Inclusive upper bound on `created_at`.
    pub date_end: Option<String>,
    /// Zero means the default of 20.
    pub limit: usize,
}

/// The searchable text of one observation, as fed to the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusDocument {
    /// Observation id.
    pub id: i64,
    /// Observation title.
    pub title: String,
    /// Observation body.
    pub text: String,
}

fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<Observation> {
    let metadata: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    Ok(Observation {
        id: row.get(0)?,
        session_id: row.get(1)?,
        obs_type: row.get(2)?,
        title: row.get(3)?,
        text: row.get(4)?,
        project: row.get(5)?,
        metadata: parse_metadata(metadata),
        created_at: parse_timestamp(7, &created_at)?,
    })
}

/// Turn free text into an FTS5 conjunction of quoted terms.
///
/// Quoting keeps operators and punctuation in user input from being parsed as
/// FTS5 syntax. Returns `None` when the text has no searchable term.
fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn sql_limit(limit: usize, default: usize) -> i64 {
    let limit = if limit == 0 { default } else { limit };
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl Database {
    /// Store a new observation and return its id.
    pub fn insert_observation(&self, obs: &NewObservation) -> DevmemResult<i64> {
        let obs_type = if obs.obs_type.is_empty() {
            DEFAULT_OBSERVATION_TYPE
        } else {
            obs.obs_type.as_str()
        };
        let metadata = match &obs.metadata {
            Some(value) => serde_json::to_string(value)?,
            None => "{}".to_string(),
        };
        let created_at = obs.created_at.map(format_timestamp);

        self.with_conn("insert observation", |conn| {
            conn.execute(
                "INSERT INTO observations (session_id, type, title, text, project, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, COALESCE(?7, datetime('now')))",
                params![
                    obs.session_id,
                    obs_type,
                    obs.title,
                    obs.text,
                    obs.project,
                    metadata,
                    created_at
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Fetch one observation by id.
    pub fn get_observation(&self, id: i64) -> DevmemResult<Option<Observation>> {
        self.with_conn("get observation", |conn| {
            conn.query_row(
                &format!("SELECT {OBSERVATION_COLUMNS} FROM observations o WHERE o.id = ?1"),
                [id],
                observation_from_row,
            )
            .optional()
        })
    }

    /// Fetch several observations by id, in ascending id order. Unknown ids
    /// are skipped.
    pub fn get_observations(&self, ids: &[i64]) -> DevmemResult<Vec<Observation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT {OBSERVATION_COLUMNS} FROM observations o WHERE o.id IN ({placeholders}) ORDER BY o.id"
        );
        self.with_conn("get observations", |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), observation_from_row)?;
            rows.collect()
        })
    }

    /// Keyword search without filters.
    pub fn search_observations(&self, query: &str, limit: usize) -> DevmemResult<Vec<Observation>> {
        self.filtered_search(&SearchFilter {
            query: query.to_string(),
            limit,
            ..SearchFilter::default()
        })
    }

    /// Keyword search with optional type, project and date filters, ordered by
    /// FTS5 relevance (best match first).
    pub fn filtered_search(&self, filter: &SearchFilter) -> DevmemResult<Vec<Observation>> {
        let Some(matcher) = fts_query(&filter.query) else {
            return Ok(Vec::new());
        };

        let mut sql = format!(
            "SELECT {OBSERVATION_COLUMNS}
             FROM observations o
             JOIN observations_fts fts ON o.id = fts.rowid
             WHERE observations_fts MATCH ?"
        );
        let mut args = vec![Value::Text(matcher)];

        if let Some(obs_type) = non_empty(&filter.obs_type) {
            sql.push_str(" AND o.type = ?");
            args.push(Value::Text(obs_type.to_string()));
        }
        if let Some(project) = non_empty(&filter.project) {
            sql.push_str(" AND o.project = ?");
            args.push(Value::Text(project.to_string()));
        }
        if let Some(start) = non_empty(&filter.date_start) {
            sql.push_str(" AND o.created_at >= ?");
            args.push(Value::Text(start.to_string()));
        }
        if let Some(end) = non_empty(&filter.date_end) {
            sql.push_str(" AND o.created_at <= ?");
            args.push(Value::Text(end.to_string()));
        }
        sql.push_str(" ORDER BY fts.rank LIMIT ?");
        args.push(Value::Integer(sql_limit(filter.limit, DEFAULT_SEARCH_LIMIT)));

        self.with_conn("filtered search", |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), observation_from_row)?;
            rows.collect()
        })
    }

    /// Most recent observations first, optionally restricted to one project.
    pub fn recent_observations(
        &self,
        project: Option<&str>,
        limit: usize,
    ) -> DevmemResult<Vec<Observation>> {
        let limit = sql_limit(limit, DEFAULT_RECENT_LIMIT);
        self.with_conn("recent observations", |conn| match project.filter(|p| !p.is_empty()) {
            Some(project) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {OBSERVATION_COLUMNS} FROM observations o
                     WHERE o.project = ?1 ORDER BY o.created_at DESC, o.id DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![project, limit], observation_from_row)?;
                rows.collect()
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {OBSERVATION_COLUMNS} FROM observations o
                     ORDER BY o.created_at DESC, o.id DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map([limit], observation_from_row)?;
                rows.collect()
            }
        })
    }

    /// The anchor observation plus up to `before` earlier and `after` later
    /// ones, in ascending id order. Zero depths mean 5.
    pub fn timeline_around(
        &self,
        anchor: i64,
        before: usize,
        after: usize,
    ) -> DevmemResult<Vec<Observation>> {
        // +1 so the anchor itself is part of the "before" window
        let before = sql_limit(before, DEFAULT_TIMELINE_DEPTH).saturating_add(1);
        let after = sql_limit(after, DEFAULT_TIMELINE_DEPTH);
        self.with_conn("timeline", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {OBSERVATION_COLUMNS} FROM observations o
                 WHERE o.id IN (SELECT id FROM observations WHERE id <= ?1 ORDER BY id DESC LIMIT ?2)
                    OR o.id IN (SELECT id FROM observations WHERE id > ?1 ORDER BY id ASC LIMIT ?3)
                 ORDER BY o.id"
            ))?;
            let rows = stmt.query_map(params![anchor, before, after], observation_from_row)?;
            rows.collect()
        })
    }

    /// Title and body of every observation, in ascending id order.
    pub fn observation_corpus(&self) -> DevmemResult<Vec<CorpusDocument>> {
        self.with_conn("load observation corpus", |conn| {
            let mut stmt = conn.prepare("SELECT id, title, text FROM observations ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok(CorpusDocument {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    text: row.get(2)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Number of stored observations.
    pub fn count_observations(&self) -> DevmemResult<usize> {
        let count: i64 = self.with_conn("count observations", |conn| {
            conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))
        })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Delete observations created more than `max_age_days` days ago and
    /// return how many were removed. Their embeddings go with them.
    pub fn delete_observations_older_than(&self, max_age_days: u32) -> DevmemResult<usize> {
        self.with_conn("delete old observations", |conn| {
            conn.execute(
                "DELETE FROM observations WHERE created_at < datetime('now', ?1)",
                [format!("-{max_age_days} days")],
            )
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn obs(obs_type: &str, title: &str, text: &str, project: &str) -> NewObservation {
        NewObservation {
            session_id: "s1".into(),
            obs_type: obs_type.into(),
            title: title.into(),
            text: text.into(),
            project: project.into(),
            ..NewObservation::default()
        }
    }

    fn seeded() -> (Database, Vec<i64>) {
        let db = Database::open_in_memory().unwrap();
        let ids = [
            obs("bugfix", "auth bug", "Fixed authentication login flow", "api"),
            obs("feature", "db migration", "Database migration for users", "api"),
            obs("bugfix", "auth token", "Authentication token expiry", "web"),
        ]
        .iter()
        .map(|o| db.insert_observation(o).unwrap())
        .collect();
        (db, ids)
    }

    #[test]
    fn test_insert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let mut new = obs("", "title", "body text", "proj");
        new.metadata = Some(serde_json::json!({"files": ["a.rs"]}));
        let id = db.insert_observation(&new).unwrap();

        let stored = db.get_observation(id).unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.obs_type, "discovery");
        assert_eq!(stored.title, "title");
        assert_eq!(stored.text, "body text");
        assert_eq!(stored.metadata["files"][0], "a.rs");
        assert!((Utc::now() - stored.created_at).num_seconds() < 60);
    }

    #[test]
    fn test_get_missing_returns_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_observation(42).unwrap().is_none());
    }

    #[test]
    fn test_get_observations_ordered_and_skips_unknown() {
        let (db, ids) = seeded();
        let found = db.get_observations(&[ids[2], 999, ids[0]]).unwrap();
        let found_ids: Vec<i64> = found.iter().map(|o| o.id).collect();
        assert_eq!(found_ids, vec![ids[0], ids[2]]);
        assert!(db.get_observations(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_keyword_search_matches_stemmed_terms() {
        let (db, ids) = seeded();
        let results = db.search_observations("authenticate", 10).unwrap();
        let found: Vec<i64> = results.iter().map(|o| o.id).collect();
        assert!(found.contains(&ids[0]));
        assert!(found.contains(&ids[2]));
        assert!(!found.contains(&ids[1]));
    }

    #[test]
    fn test_filtered_search_applies_type_and_project() {
        let (db, ids) = seeded();
        let results = db
            .filtered_search(&SearchFilter {
                query: "authentication".into(),
                project: Some("web".into()),
                ..SearchFilter::default()
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, ids[2]);

        let results = db
            .filtered_search(&SearchFilter {
                query: "authentication".into(),
                obs_type: Some("feature".into()),
                ..SearchFilter::default()
            })
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_tolerates_fts_syntax_in_input() {
        let (db, _) = seeded();
        assert!(db.search_observations("auth* AND (\"broken", 10).is_ok());
        assert!(db.search_observations("NEAR(", 10).is_ok());
        assert!(db.search_observations("   ", 10).unwrap().is_empty());
        assert!(db.search_observations("--- !!", 10).unwrap().is_empty());
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("auth flow").unwrap(), "\"auth\" \"flow\"");
        assert_eq!(fts_query("say \"hi\"").unwrap(), "\"say\" \"\"\"hi\"\"\"");
        assert!(fts_query(" - ").is_none());
    }

    #[test]
    fn test_recent_observations_newest_first() {
        let (db, ids) = seeded();
        let recent = db.recent_observations(None, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, ids[2]);

        let api_only = db.recent_observations(Some("api"), 0).unwrap();
        assert_eq!(api_only.len(), 2);
        assert!(api_only.iter().all(|o| o.project == "api"));
    }

    #[test]
    fn test_timeline_around_anchor_near_start() {
        let db = Database::open_in_memory().unwrap();
        let ids: Vec<i64> = (0..8)
            .map(|i| {
                db.insert_observation(&obs("discovery", &format!("t{i}"), "x", ""))
                    .unwrap()
            })
            .collect();

        let timeline = db.timeline_around(ids[1], 3, 2).unwrap();
        let got: Vec<i64> = timeline.iter().map(|o| o.id).collect();
        assert_eq!(got, vec![ids[0], ids[1], ids[2], ids[3]]);
    }

    #[test]
    fn test_corpus_in_id_order() {
        let (db, ids) = seeded();
        let corpus = db.observation_corpus().unwrap();
        assert_eq!(corpus.iter().map(|d| d.id).collect::<Vec<_>>(), ids);
        assert_eq!(corpus[1].title, "db migration");
    }

    #[test]
    fn test_delete_older_than() {
        let db = Database::open_in_memory().unwrap();
        db.insert_observation(&obs("discovery", "fresh", "x", "")).unwrap();
        let mut old = obs("discovery", "stale", "y", "");
        old.created_at = Some(Utc::now() - chrono::Duration::days(120));
        db.insert_observation(&old).unwrap();

        assert_eq!(db.delete_observations_older_than(90).unwrap(), 1);
        assert_eq!(db.count_observations().unwrap(), 1);
        assert_eq!(db.delete_observations_older_than(90).unwrap(), 0);
    }

    #[test]
    fn test_new_observation_deserializes_with_defaults() {
        let parsed: NewObservation =
            serde_json::from_str(r#"{"text": "only text", "type": "decision"}"#).unwrap();
        assert_eq!(parsed.text, "only text");
        assert_eq!(parsed.obs_type, "decision");
        assert!(parsed.session_id.is_empty());
        assert!(parsed.created_at.is_none());
    }
}
