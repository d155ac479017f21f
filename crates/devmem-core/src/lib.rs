//! Core error definitions for the devmem workspace.
//!
//! Every crate in the workspace reports failures through [`DevmemError`] and
//! returns [`DevmemResult`].
//!
//! # Main types
//!
//! - [`DevmemError`] — Unified error enum for all devmem subsystems.
//! - [`DevmemResult`] — Convenience alias for `Result<T, DevmemError>`.

/// Top-level error type for devmem.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum DevmemError {
    /// A read, write or transaction against the observation database failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record that was looked up by id does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An error raised while building or querying the search index.
    #[error("Search error: {0}")]
    Search(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the HTTP service layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DevmemError {
    /// Returns `true` for [`DevmemError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, DevmemError::NotFound(_))
    }
}

/// A convenience `Result` alias using [`DevmemError`].
pub type DevmemResult<T> = Result<T, DevmemError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_subsystem() {
        let err = DevmemError::Storage("insert observation: disk full".into());
        assert_eq!(err.to_string(), "Storage error: insert observation: disk full");

        let err = DevmemError::NotFound("observation 7".into());
        assert_eq!(err.to_string(), "Not found: observation 7");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_json_error_converts() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: DevmemError = parse.unwrap_err().into();
        assert!(matches!(err, DevmemError::Json(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DevmemError = io.into();
        assert!(err.to_string().starts_with("IO error:"));
    }
}
