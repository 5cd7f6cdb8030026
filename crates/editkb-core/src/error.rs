//! Error taxonomy for editkb.
//!
//! Data-shape problems in candidate plans are never errors; they are
//! reported as [`ValidationIssue`](crate::models::ValidationIssue)s.
//! The variants here cover malformed source files, unreadable cache
//! artifacts, and programmer-contract violations.

use std::path::PathBuf;

/// Top-level error type for all core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed Markdown or JSON input. Scoped to one source file.
    #[error("structural parse error in {id}: {message}")]
    StructuralParse { id: String, message: String },

    /// A cache artifact failed to deserialize.
    #[error("cache artifact {path:?} is corrupt: {message}")]
    CacheCorruption { path: PathBuf, message: String },

    /// Vector dimensionality disagrees with the index or cache.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// `top_k` must be a positive integer.
    #[error("top_k must be >= 1, got {0}")]
    InvalidTopK(usize),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a structural parse error for the document `id`.
    pub fn parse(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StructuralParse {
            id: id.into(),
            message: msg.into(),
        }
    }

    /// Create a cache corruption error for the artifact at `path`.
    pub fn corrupt(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::CacheCorruption {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that indicate a configuration or version mismatch
    /// rather than bad input data.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. } | Self::InvalidTopK(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CoreError::parse("guides/motion.md", "unterminated front matter");
        assert_eq!(
            err.to_string(),
            "structural parse error in guides/motion.md: unterminated front matter"
        );

        let err = CoreError::DimensionMismatch {
            expected: 512,
            actual: 384,
        };
        assert!(err.to_string().contains("expected 512"));
    }

    #[test]
    fn contract_violations_are_flagged() {
        assert!(CoreError::InvalidTopK(0).is_contract_violation());
        assert!(!CoreError::parse("a.md", "x").is_contract_violation());
    }
}
