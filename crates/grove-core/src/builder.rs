//! Index builder traits.
//!
//! This module defines the narrow interface between the filesystem indexer
//! and whatever builds the searchable corpus. The indexer only ever sees
//! these traits, so tokenization, storage and querying stay on the other
//! side of the seam.
//!
//! ## Implementing a Builder
//!
//! 1. Implement `IndexBuilder` for the shared corpus type
//! 2. Return a `TreeHandle` from `open_tree` that buffers or streams files
//! 3. Make `finalize` idempotent: the indexer calls it once, but repeated
//!    calls must leave the corpus unchanged
//!
//! [`CodeIndex`](crate::index::CodeIndex) is the in-memory implementation.

use crate::error::Result;
use crate::types::{FileRecord, SkippedEntry, TreeIdentity, WalkReport};

/// Shared corpus that trees are registered into.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: several indexers may open and
/// finalize trees concurrently against the same builder. Structural
/// mutations (publishing a sealed tree) must be serialized internally.
pub trait IndexBuilder: Send + Sync {
    /// Open a new tree for registration.
    ///
    /// Fails with `GroveError::NameCollision` if a tree with the same name
    /// is open and not yet finalized.
    fn open_tree(&self, identity: TreeIdentity) -> Result<Box<dyn TreeHandle>>;
}

/// Write access to one tree's slot in the index.
///
/// Files are registered in the order the walk discovers them; the order is
/// preserved by the builder.
pub trait TreeHandle: Send {
    /// Identity this handle was opened with
    fn identity(&self) -> &TreeIdentity;

    /// Add one file to the tree.
    ///
    /// Fails with `GroveError::AlreadySealed` after `finalize`.
    fn register(&mut self, record: FileRecord) -> Result<()>;

    /// Seal the tree. Calling it again is a no-op.
    fn finalize(&mut self) -> Result<()>;

    /// Whether `finalize` has been called
    fn is_sealed(&self) -> bool;
}

/// Observer for walk events.
pub trait WalkProgress: Send + Sync {
    /// Called after a file has been registered
    fn on_registered(&self, path: &str, bytes: u64);

    /// Called when a candidate is skipped for a per-file reason
    fn on_skipped(&self, entry: &SkippedEntry);

    /// Called when the walk is complete
    fn on_complete(&self, report: &WalkReport);
}

/// A simple progress reporter that logs to tracing
pub struct LoggingProgress {
    tree: String,
}

impl LoggingProgress {
    pub fn new(tree: impl Into<String>) -> Self {
        LoggingProgress { tree: tree.into() }
    }
}

impl WalkProgress for LoggingProgress {
    fn on_registered(&self, path: &str, bytes: u64) {
        tracing::trace!(tree = %self.tree, path, bytes, "Registered file");
    }

    fn on_skipped(&self, entry: &SkippedEntry) {
        tracing::debug!(
            tree = %self.tree,
            path = %entry.path,
            reason = %entry.reason,
            "Skipped file"
        );
    }

    fn on_complete(&self, report: &WalkReport) {
        tracing::info!(
            tree = %self.tree,
            files = report.registered,
            bytes = report.registered_bytes,
            skipped = report.skipped_count(),
            "Walk complete"
        );
    }
}
