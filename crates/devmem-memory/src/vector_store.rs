use std::sync::Arc;

use devmem_core::{DevmemError, DevmemResult};
use devmem_store::Database;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::codec::{decode_vector, encode_vector};
use crate::similarity::cosine_similarity;
use crate::vocabulary::Vocabulary;

const DEFAULT_LIMIT: usize = 10;

/// One vector-search hit with its cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorResult {
    /// Observation id.
    pub id: i64,
    /// Cosine similarity to the query, in `(0, 1]`.
    pub score: f64,
    /// Observation title.
    pub title: String,
    /// Observation body.
    pub text: String,
    /// Observation type, e.g. `bugfix` or `decision`.
    #[serde(rename = "type")]
    pub obs_type: String,
    /// Project the observation belongs to.
    pub project: String,
    /// Session that recorded the observation.
    pub session_id: String,
}

/// TF-IDF embeddings for every observation, plus the vocabulary that
/// produced them.
///
/// The vocabulary is rebuilt from the whole corpus on every index call and
/// swapped in only after the matching embeddings have been committed, so a
/// concurrent [`search`](Self::search) always sees one consistent generation.
pub struct VectorStore {
    db: Arc<Database>,
    vocab: RwLock<Option<Arc<Vocabulary>>>,
    /// Serializes rebuilds so two writers never interleave.
    rebuild: Mutex<()>,
}

impl VectorStore {
    /// Create a store over `db`. No vocabulary exists until the first
    /// [`index_all`](Self::index_all).
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            vocab: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    /// Dimensionality of the current vocabulary, or `None` before the first
    /// successful rebuild.
    pub async fn vocabulary_size(&self) -> Option<usize> {
        self.vocab.read().await.as_ref().map(|v| v.size())
    }

    /// Rebuild the vocabulary and every embedding from the full corpus.
    ///
    /// All embedding rows are replaced in one transaction. On failure the
    /// table and the in-memory vocabulary keep the previous generation.
    /// Returns the number of documents indexed; an empty corpus is a no-op.
    pub async fn index_all(&self) -> DevmemResult<usize> {
        let _rebuilding = self.rebuild.lock().await;

        let corpus = self.db.observation_corpus()?;
        if corpus.is_empty() {
            debug!("No observations to index");
            return Ok(0);
        }

        let documents: Vec<String> = corpus
            .iter()
            .map(|doc| format!("{} {}", doc.title, doc.text))
            .collect();
        let vocab = Vocabulary::build(&documents);
        let rows: Vec<(i64, Vec<u8>)> = corpus
            .iter()
            .zip(&documents)
            .map(|(doc, text)| (doc.id, encode_vector(&vocab.embed(text))))
            .collect();

        let mut current = self.vocab.write().await;
        self.db.transaction("replace embeddings", |tx| {
            tx.execute("DELETE FROM observation_embeddings", [])?;
            let mut insert = tx.prepare(
                "INSERT INTO observation_embeddings (observation_id, embedding) VALUES (?1, ?2)",
            )?;
            for (id, blob) in &rows {
                insert.execute(params![id, blob])?;
            }
            Ok(())
        })?;

        info!(
            documents = rows.len(),
            vocabulary = vocab.size(),
            "Rebuilt vector index"
        );
        *current = Some(Arc::new(vocab));
        Ok(rows.len())
    }

    /// Index one newly stored observation.
    ///
    /// This rebuilds the whole index: a new document can change every IDF
    /// weight, and embeddings from different vocabularies are not comparable.
    pub async fn index_observation(&self, id: i64) -> DevmemResult<()> {
        if self.db.get_observation(id)?.is_none() {
            return Err(DevmemError::NotFound(format!("observation {id}")));
        }
        self.index_all().await?;
        Ok(())
    }

    /// Brute-force cosine search over every stored embedding.
    ///
    /// Returns at most `limit` hits (zero means 10) with similarity above
    /// zero, best first. Empty before the first rebuild.
    pub async fn search(&self, query: &str, limit: usize) -> DevmemResult<Vec<VectorResult>> {
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };

        let guard = self.vocab.read().await;
        let Some(vocab) = &*guard else {
            return Ok(Vec::new());
        };
        let query_vector = vocab.embed(query);

        let stored = self.db.with_conn("load embeddings", |conn| {
            let mut stmt = conn.prepare(
                "SELECT e.observation_id, e.embedding, o.title, o.text, o.type, o.project, o.session_id
                 FROM observation_embeddings e
                 JOIN observations o ON o.id = e.observation_id
                 ORDER BY e.observation_id",
            )?;
            let rows = stmt.query_map([], |row| {
                let blob: Vec<u8> = row.get(1)?;
                Ok((
                    VectorResult {
                        id: row.get(0)?,
                        score: 0.0,
                        title: row.get(2)?,
                        text: row.get(3)?,
                        obs_type: row.get(4)?,
                        project: row.get(5)?,
                        session_id: row.get(6)?,
                    },
                    blob,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        let mut results = Vec::new();
        for (mut hit, blob) in stored {
            let score = cosine_similarity(&query_vector, &decode_vector(&blob)?);
            if score > 0.0 {
                hit.score = score;
                results.push(hit);
            }
        }
        drop(guard);

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        results.truncate(limit);
        Ok(results)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use devmem_store::NewObservation;

    fn store_with(texts: &[(&str, &str)]) -> (Arc<Database>, VectorStore, Vec<i64>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ids = texts
            .iter()
            .map(|(title, text)| {
                db.insert_observation(&NewObservation {
                    session_id: "s1".into(),
                    title: (*title).into(),
                    text: (*text).into(),
                    ..NewObservation::default()
                })
                .unwrap()
            })
            .collect();
        let store = VectorStore::new(db.clone());
        (db, store, ids)
    }

    fn embedding_count(db: &Database) -> i64 {
        db.with_conn("count", |conn| {
            conn.query_row("SELECT COUNT(*) FROM observation_embeddings", [], |r| r.get(0))
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_search_before_index_is_empty() {
        let (_db, store, _) = store_with(&[("auth", "login flow")]);
        assert!(store.search("login", 5).await.unwrap().is_empty());
        assert_eq!(store.vocabulary_size().await, None);
    }

    #[tokio::test]
    async fn test_index_all_on_empty_corpus_is_noop() {
        let (_db, store, _) = store_with(&[]);
        assert_eq!(store.index_all().await.unwrap(), 0);
        assert_eq!(store.vocabulary_size().await, None);
    }

    #[tokio::test]
    async fn test_index_all_writes_one_embedding_per_observation() {
        let (db, store, _) = store_with(&[
            ("auth", "login flow broken"),
            ("db", "migration failed"),
        ]);
        assert_eq!(store.index_all().await.unwrap(), 2);
        assert_eq!(embedding_count(&db), 2);
        // auth login flow broken db migration failed
        assert_eq!(store.vocabulary_size().await, Some(7));
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_generation() {
        let (db, store, _) = store_with(&[("auth", "login flow")]);
        store.index_all().await.unwrap();
        let first = store.vocabulary_size().await.unwrap();

        db.insert_observation(&NewObservation {
            title: "cache".into(),
            text: "redis eviction policy".into(),
            ..NewObservation::default()
        })
        .unwrap();
        store.index_all().await.unwrap();

        assert!(store.vocabulary_size().await.unwrap() > first);
        assert_eq!(embedding_count(&db), 2);

        let blobs: Vec<usize> = db
            .with_conn("lengths", |conn| {
                let mut stmt = conn.prepare("SELECT length(embedding) FROM observation_embeddings")?;
                let rows = stmt.query_map([], |r| r.get::<_, usize>(0))?;
                rows.collect()
            })
            .unwrap();
        let size = store.vocabulary_size().await.unwrap();
        assert!(blobs.iter().all(|&len| len == size * 8));
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let (_db, store, ids) = store_with(&[
            ("auth", "login session token"),
            ("db", "migration schema"),
            ("auth again", "login retry"),
        ]);
        store.index_all().await.unwrap();

        let hits = store.search("login session", 10).await.unwrap();
        assert_eq!(hits[0].id, ids[0]);
        assert!(hits.iter().all(|h| h.score > 0.0));
        assert!(hits.iter().all(|h| h.id != ids[1]), "no-overlap docs are dropped");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_search_limit() {
        let (_db, store, _) = store_with(&[
            ("one", "shared term"),
            ("two", "shared term"),
            ("three", "shared term"),
        ]);
        store.index_all().await.unwrap();
        assert_eq!(store.search("shared", 2).await.unwrap().len(), 2);
        assert_eq!(store.search("shared", 0).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_index_observation_requires_existing_row() {
        let (_db, store, ids) = store_with(&[("auth", "login")]);
        let err = store.index_observation(999).await.unwrap_err();
        assert!(err.is_not_found());

        store.index_observation(ids[0]).await.unwrap();
        assert_eq!(store.search("login", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_blob_surfaces_error() {
        let (db, store, ids) = store_with(&[("auth", "login")]);
        store.index_all().await.unwrap();
        db.with_conn("corrupt", |conn| {
            conn.execute(
                "UPDATE observation_embeddings SET embedding = ?1 WHERE observation_id = ?2",
                params![vec![1u8, 2, 3], ids[0]],
            )
        })
        .unwrap();

        let err = store.search("login", 5).await.unwrap_err();
        assert!(matches!(err, DevmemError::Search(_)));
    }
}
