//! Error types for Grove core operations.
//!
//! Library-level failures are modelled with `thiserror`; the CLI wraps them
//! in `anyhow`. Problems with individual files during a walk are not errors
//! at all: they are reported as [`SkipReason`](crate::types::SkipReason)
//! values in the walk report.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using GroveError
pub type Result<T> = std::result::Result<T, GroveError>;

/// Core error types for Grove operations.
#[derive(Error, Debug)]
pub enum GroveError {
    // === Construction Errors ===
    /// The repository root does not exist
    #[error("repository root not found: {}", .path.display())]
    RootNotFound { path: PathBuf },

    /// The repository root exists but is not a directory
    #[error("repository root is not a directory: {}", .path.display())]
    RootNotDirectory { path: PathBuf },

    /// Tree names must be non-empty
    #[error("invalid tree name {name:?}: {reason}")]
    InvalidTreeName { name: String, reason: String },

    /// Another tree with this name is still open in the index
    #[error("tree {name:?} is already open in this index")]
    NameCollision { name: String },

    // === Walk Errors ===
    /// A registration was attempted on a sealed tree
    #[error("tree {name:?} is sealed and accepts no more files")]
    AlreadySealed { name: String },

    /// The indexer has already performed its walk
    #[error("tree {name:?} has already been walked")]
    AlreadyWalked { name: String },

    /// The recursive walk start path escapes the repository root
    #[error("walk start path {} is outside the repository root", .path.display())]
    InvalidStartPath { path: PathBuf },

    /// The recursive walk start path does not exist
    #[error("walk start path not found: {}", .path.display())]
    StartPathNotFound { path: PathBuf },

    /// The recursive walk start path lies in a directory walks never enter
    #[error("walk start path {} is inside a skipped directory", .path.display())]
    SkippedStartPath { path: PathBuf },

    // === Configuration Errors ===
    /// Configuration file parsing or validation failed
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GroveError {
    /// Returns true if this error can only be produced while constructing an
    /// indexer, before any tree handle exists.
    pub fn is_fatal_at_construction(&self) -> bool {
        matches!(
            self,
            GroveError::RootNotFound { .. }
                | GroveError::RootNotDirectory { .. }
                | GroveError::InvalidTreeName { .. }
                | GroveError::NameCollision { .. }
        )
    }

    /// Returns true if this error means the indexer and its builder disagree
    /// about the state of a tree.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, GroveError::AlreadySealed { .. })
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        GroveError::ConfigError {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_errors() {
        let err = GroveError::RootNotFound {
            path: PathBuf::from("/missing"),
        };
        assert!(err.is_fatal_at_construction());

        let err = GroveError::NameCollision {
            name: "linux".to_string(),
        };
        assert!(err.is_fatal_at_construction());
        assert!(!err.is_invariant_violation());

        let err = GroveError::AlreadySealed {
            name: "linux".to_string(),
        };
        assert!(!err.is_fatal_at_construction());
        assert!(err.is_invariant_violation());

        let err = GroveError::SkippedStartPath {
            path: PathBuf::from(".git"),
        };
        assert!(!err.is_fatal_at_construction());
        assert!(!err.is_invariant_violation());
    }

    #[test]
    fn test_display() {
        let err = GroveError::NameCollision {
            name: "linux".to_string(),
        };
        assert_eq!(err.to_string(), "tree \"linux\" is already open in this index");
    }
}
