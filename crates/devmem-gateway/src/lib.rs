//! HTTP/JSON service layer for devmem.
//!
//! Exposes observation storage, keyword and hybrid search, index
//! maintenance, and session/summary bookkeeping over an axum router.

/// API error type and its JSON rendering.
pub mod error;
/// Observation, search and timeline handlers.
pub mod observations;
/// Router construction and shared state.
pub mod server;
/// Session and summary handlers.
pub mod sessions;

pub use error::{ApiError, ApiResult};
pub use server::{AppState, GatewayServer};
