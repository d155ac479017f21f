//! Hybrid keyword + vector search and retention for devmem observations.
//!
//! Observations are embedded as TF-IDF vectors over a vocabulary rebuilt from
//! the whole corpus, searched by brute-force cosine similarity, and fused with
//! SQLite FTS5 keyword hits. A background scheduler keeps the store bounded.
//!
//! # Main types
//!
//! - [`Vocabulary`] — Token index and IDF table; embeds text into vectors.
//! - [`VectorStore`] — Persisted embeddings plus the current vocabulary.
//! - [`HybridSearcher`] — Fuses keyword and vector scores into one ranking.
//! - [`Retention`] — One-shot pruning and its periodic [`SchedulerHandle`].

/// Little-endian `f64` blob encoding for stored embeddings.
pub mod codec;
/// Plain-text rendering of search results.
pub mod formatter;
/// Score fusion across the keyword and vector legs.
pub mod hybrid;
/// Observation pruning and the background scheduler.
pub mod retention;
/// Cosine similarity.
pub mod similarity;
/// Text to token splitting with stop-word removal.
pub mod tokenizer;
/// Persisted embeddings and brute-force vector search.
pub mod vector_store;
/// TF-IDF vocabulary.
pub mod vocabulary;

pub use codec::{decode_vector, encode_vector};
pub use formatter::{format_result, format_results};
pub use hybrid::{HybridResult, HybridSearcher, SearchQuery, SearchWeights};
pub use retention::{Retention, RetentionConfig, RetentionReport, SchedulerHandle, SchedulerState};
pub use similarity::cosine_similarity;
pub use tokenizer::tokenize;
pub use vector_store::{VectorResult, VectorStore};
pub use vocabulary::Vocabulary;
