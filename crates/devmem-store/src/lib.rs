//! SQLite persistence for the devmem observation memory.
//!
//! Stores observations (with an FTS5 keyword index kept in sync by triggers),
//! coding sessions and session summaries, and exposes the raw maintenance
//! statements used by retention.
//!
//! # Main types
//!
//! - [`Database`] — A migrated SQLite connection shared across the process.
//! - [`Observation`] / [`NewObservation`] — Stored and to-be-inserted records.
//! - [`SearchFilter`] — Keyword query with type, project and date filters.
//! - [`Session`] / [`NewSession`] — Coding session bookkeeping.
//! - [`Summary`] — Session-end summaries.

/// Connection handling, transactions and compaction.
pub mod database;
/// Ordered, append-only schema migrations.
mod migrations;
/// Observation records and keyword search.
pub mod observations;
/// Coding session records.
pub mod sessions;
/// Session-end summaries.
pub mod summaries;

pub use database::{format_timestamp, Database};
pub use observations::{CorpusDocument, NewObservation, Observation, SearchFilter};
pub use sessions::{NewSession, Session};
pub use summaries::Summary;
