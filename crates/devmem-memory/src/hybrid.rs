use std::collections::HashMap;
use std::sync::Arc;

use devmem_core::DevmemResult;
use devmem_store::{Database, Observation, SearchFilter};
use serde::{Deserialize, Serialize};

use crate::vector_store::{VectorResult, VectorStore};

const DEFAULT_LIMIT: usize = 20;

/// Weights applied to each retrieval leg before the scores are summed.
///
/// They do not need to add up to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchWeights {
    /// Weight of the positional keyword score.
    pub fts: f64,
    /// Weight of the cosine similarity score.
    pub vector: f64,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            fts: 0.4,
            vector: 0.6,
        }
    }
}

/// A hybrid search request.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Free-text query fed to both search legs.
    pub text: String,
    /// Only return observations of this type. Empty matches all.
    pub obs_type: Option<String>,
    /// Only return observations from this project. Empty matches all.
    pub project: Option<String>,
    /// Zero means the default of 20.
    pub limit: usize,
}

impl SearchQuery {
    /// An unfiltered query with the default limit.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_LIMIT
        } else {
            self.limit
        }
    }

    fn accepts(&self, obs_type: &str, project: &str) -> bool {
        let type_ok = self
            .obs_type
            .as_deref()
            .map_or(true, |t| t.is_empty() || t == obs_type);
        let project_ok = self
            .project
            .as_deref()
            .map_or(true, |p| p.is_empty() || p == project);
        type_ok && project_ok
    }
}

/// One observation with its fused relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridResult {
    /// Observation id.
    pub id: i64,
    /// Weighted sum of the keyword and vector scores.
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

impl HybridResult {
    fn from_observation(obs: Observation, score: f64) -> Self {
        Self {
            id: obs.id,
            score,
            title: obs.title,
            text: obs.text,
            obs_type: obs.obs_type,
            project: obs.project,
            session_id: obs.session_id,
        }
    }

    fn from_vector(hit: VectorResult, score: f64) -> Self {
        Self {
            id: hit.id,
            score,
            title: hit.title,
            text: hit.text,
            obs_type: hit.obs_type,
            project: hit.project,
            session_id: hit.session_id,
        }
    }
}

/// Score of the keyword hit at 0-based `rank` out of `total`: 1.0 for the
/// best match, falling linearly.
fn positional_score(rank: usize, total: usize) -> f64 {
    1.0 - rank as f64 / total as f64
}

/// Hybrid searcher that fuses SQLite FTS5 keyword hits with TF-IDF cosine
/// similarity.
///
/// For each query both legs fetch `2 × limit` candidates:
/// - keyword hits are filtered by type/project inside the query and scored by
///   position, `1 - rank/total`
/// - vector hits are fetched unfiltered, then non-matching ones are dropped
///   (and not replaced)
///
/// Each leg's score is multiplied by its [`SearchWeights`] entry, and ids found
/// by both legs get the sum.
pub struct HybridSearcher {
    db: Arc<Database>,
    vectors: VectorStore,
    weights: SearchWeights,
}

impl HybridSearcher {
    /// Create a searcher with the default 0.4 / 0.6 weights.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            vectors: VectorStore::new(db.clone()),
            db,
            weights: SearchWeights::default(),
        }
    }

    /// Replace the fusion weights. Chainable builder method.
    pub fn with_weights(mut self, weights: SearchWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Current fusion weights.
    pub fn weights(&self) -> SearchWeights {
        self.weights
    }

    /// The underlying vector index.
    pub fn vector_store(&self) -> &VectorStore {
        &self.vectors
    }

    /// Run both legs and return at most `limit` fused results, best first.
    /// Equal scores are ordered by ascending id.
    pub async fn search(&self, query: &SearchQuery) -> DevmemResult<Vec<HybridResult>> {
        let limit = query.effective_limit();
        let fetch = limit.saturating_mul(2);

        let keyword = self.db.filtered_search(&SearchFilter {
            query: query.text.clone(),
            obs_type: query.obs_type.clone(),
            project: query.project.clone(),
            limit: fetch,
            ..SearchFilter::default()
        })?;
        let vector = self.vectors.search(&query.text, fetch).await?;

        let mut merged: HashMap<i64, HybridResult> = HashMap::new();

        let total = keyword.len();
        for (rank, obs) in keyword.into_iter().enumerate() {
            let score = positional_score(rank, total) * self.weights.fts;
            merged.insert(obs.id, HybridResult::from_observation(obs, score));
        }

        for hit in vector {
            if !query.accepts(&hit.obs_type, &hit.project) {
                continue;
            }
            let contribution = hit.score * self.weights.vector;
            merged
                .entry(hit.id)
                .and_modify(|r| r.score += contribution)
                .or_insert_with(|| HybridResult::from_vector(hit, contribution));
        }

        let mut results: Vec<HybridResult> = merged.into_values().collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        results.truncate(limit);

        tracing::debug!(query = %query.text, results = results.len(), "Hybrid search");
        Ok(results)
    }

    /// Force a full rebuild of the vector index. Returns the number of
    /// documents indexed.
    pub async fn rebuild_index(&self) -> DevmemResult<usize> {
        self.vectors.index_all().await
    }

    /// Index a newly stored observation (triggers a full rebuild).
    pub async fn index_observation(&self, id: i64) -> DevmemResult<()> {
        self.vectors.index_observation(id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use devmem_store::NewObservation;

    async fn searcher(rows: &[(&str, &str, &str, &str)]) -> (HybridSearcher, Vec<i64>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ids = rows
            .iter()
            .map(|(obs_type, project, title, text)| {
                db.insert_observation(&NewObservation {
                    session_id: "s1".into(),
                    obs_type: (*obs_type).into(),
                    project: (*project).into(),
                    title: (*title).into(),
                    text: (*text).into(),
                    ..NewObservation::default()
                })
                .unwrap()
            })
            .collect();
        let searcher = HybridSearcher::new(db);
        searcher.rebuild_index().await.unwrap();
        (searcher, ids)
    }

    #[test]
    fn test_default_weights() {
        let w = SearchWeights::default();
        assert_eq!(w.fts, 0.4);
        assert_eq!(w.vector, 0.6);
    }

    #[test]
    fn test_positional_score() {
        assert_eq!(positional_score(0, 4), 1.0);
        assert_eq!(positional_score(1, 4), 0.75);
        assert_eq!(positional_score(3, 4), 0.25);
    }

    #[test]
    fn test_query_accepts() {
        let mut q = SearchQuery::new("x");
        assert!(q.accepts("bugfix", "api"));
        q.obs_type = Some("bugfix".into());
        assert!(q.accepts("bugfix", "web"));
        assert!(!q.accepts("feature", "web"));
        q.project = Some(String::new());
        assert!(q.accepts("bugfix", "anything"));
    }

    #[tokio::test]
    async fn test_hit_in_both_legs_sums_weighted_scores() {
        let (searcher, ids) = searcher(&[("discovery", "", "cache", "redis cache eviction")]).await;
        let hits = searcher
            .search(&SearchQuery::new("redis"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, ids[0]);

        let vector = searcher.vector_store().search("redis", 40).await.unwrap();
        let expected = 1.0 * 0.4 + vector[0].score * 0.6;
        assert!((hits[0].score - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_custom_weights_disable_vector_leg() {
        let (searcher, _) = searcher(&[
            ("discovery", "", "redis", "redis cache"),
            ("discovery", "", "other", "redis"),
        ])
        .await;
        let searcher = searcher.with_weights(SearchWeights {
            fts: 1.0,
            vector: 0.0,
        });
        let hits = searcher.search(&SearchQuery::new("redis")).await.unwrap();
        let mut scores: Vec<f64> = hits.iter().map(|h| h.score).collect();
        scores.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(scores, vec![1.0, 0.5]);
    }

    #[tokio::test]
    async fn test_type_filter_applies_to_both_legs() {
        let (searcher, ids) = searcher(&[
            ("bugfix", "api", "auth", "login token expired"),
            ("feature", "api", "auth", "login page redesign"),
        ])
        .await;
        let hits = searcher
            .search(&SearchQuery {
                text: "login".into(),
                obs_type: Some("bugfix".into()),
                ..SearchQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![ids[0]]);
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let (searcher, _) = searcher(&[
            ("discovery", "", "a1", "shared topic"),
            ("discovery", "", "a2", "shared topic"),
            ("discovery", "", "a3", "shared topic"),
        ])
        .await;
        let hits = searcher
            .search(&SearchQuery {
                text: "shared".into(),
                limit: 2,
                ..SearchQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_result_serializes_type_field() {
        let r = HybridResult {
            id: 1,
            score: 0.5,
            title: "t".into(),
            text: "x".into(),
            obs_type: "bugfix".into(),
            project: "p".into(),
            session_id: "s".into(),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["type"], "bugfix");
        assert_eq!(json["session_id"], "s");
    }
}
