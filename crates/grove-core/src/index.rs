//! In-memory index builder.
//!
//! `CodeIndex` is the shared corpus that filesystem walks register into. It
//! supports:
//!
//! - Opening many named trees at once, one handle per walk
//! - Buffering registrations inside each handle, away from shared state
//! - Publishing a tree atomically when its handle is finalized
//! - Deduplicating identical file contents across all trees
//!
//! ## Architecture
//!
//! - A `DashMap<String, u64>` claims the names of trees that are open; the
//!   value is a ticket so a stale handle never releases a newer claim
//! - A `DashMap<Arc<[u8]>, ()>` interns file contents
//! - A `RwLock<Vec<Arc<IndexedTree>>>` holds sealed trees in sealing order
//!
//! Readers never observe a tree until it is sealed, and a sealed tree never
//! changes.

use crate::builder::{IndexBuilder, TreeHandle};
use crate::error::{GroveError, Result};
use crate::types::{FileRecord, IndexStats, TreeIdentity};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The in-memory code index.
///
/// This structure is designed for concurrent access:
/// - Multiple walks can register into distinct trees simultaneously
/// - Publishing sealed trees is serialized via internal locking
///
/// ## Example
///
/// ```rust
/// use grove_core::{CodeIndex, FileRecord, IndexBuilder, TreeHandle, TreeIdentity};
///
/// let index = CodeIndex::new();
/// let mut handle = index.open_tree(TreeIdentity::new("demo")).unwrap();
/// handle.register(FileRecord::new("README", "hello")).unwrap();
/// handle.finalize().unwrap();
///
/// assert_eq!(index.tree("demo").unwrap().len(), 1);
/// ```
pub struct CodeIndex {
    shared: Arc<IndexShared>,
}

struct IndexShared {
    /// Sealed trees, in sealing order
    trees: RwLock<Vec<Arc<IndexedTree>>>,

    /// Names of open trees mapped to the ticket of the handle holding them
    open: DashMap<String, u64>,

    /// Interned file contents
    blobs: DashMap<Arc<[u8]>, ()>,

    /// Bytes held by `blobs`
    blob_bytes: AtomicU64,

    /// Statistics about sealed trees
    stats: RwLock<IndexStats>,

    /// Generation counter, bumped on every structural change
    generation: AtomicU64,

    next_ticket: AtomicU64,
}

/// A sealed tree.
#[derive(Debug)]
pub struct IndexedTree {
    /// Name and metadata the tree was opened with
    pub identity: TreeIdentity,

    /// Files in registration order
    pub files: Vec<IndexedFile>,

    /// When the tree was sealed
    pub sealed_at: DateTime<Utc>,
}

impl IndexedTree {
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Number of files in the tree
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Relative paths in registration order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }

    /// Look up a file by relative path
    pub fn file(&self, path: &str) -> Option<&IndexedFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Content bytes in the tree, counting duplicates
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.content.len() as u64).sum()
    }
}

/// One file of a sealed tree.
#[derive(Debug, Clone)]
pub struct IndexedFile {
    /// Path relative to the tree root
    pub path: String,

    /// Content, shared with every other file holding the same bytes
    pub content: Arc<[u8]>,
}

impl IndexedFile {
    /// Content as UTF-8, if valid
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

impl Default for CodeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        CodeIndex {
            shared: Arc::new(IndexShared {
                trees: RwLock::new(Vec::new()),
                open: DashMap::new(),
                blobs: DashMap::new(),
                blob_bytes: AtomicU64::new(0),
                stats: RwLock::new(IndexStats::new()),
                generation: AtomicU64::new(0),
                next_ticket: AtomicU64::new(1),
            }),
        }
    }

    /// Number of sealed trees.
    pub fn len(&self) -> usize {
        self.shared.trees.read().len()
    }

    /// Check if no tree has been sealed.
    pub fn is_empty(&self) -> bool {
        self.shared.trees.read().is_empty()
    }

    /// All sealed trees, in sealing order.
    pub fn trees(&self) -> Vec<Arc<IndexedTree>> {
        self.shared.trees.read().clone()
    }

    /// The most recently sealed tree with the given name.
    pub fn tree(&self, name: &str) -> Option<Arc<IndexedTree>> {
        self.shared
            .trees
            .read()
            .iter()
            .rev()
            .find(|t| t.name() == name)
            .cloned()
    }

    /// Whether a tree with this name is open and not yet finalized.
    pub fn is_open(&self, name: &str) -> bool {
        self.shared.open.contains_key(name)
    }

    /// Names of open trees, sorted.
    pub fn open_trees(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.open.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Get current index statistics.
    pub fn stats(&self) -> IndexStats {
        let mut stats = self.shared.stats.read().clone();
        stats.unique_blobs = self.shared.blobs.len() as u64;
        stats.unique_bytes = self.shared.blob_bytes.load(Ordering::Acquire);
        stats
    }

    /// Get the current generation (modification counter).
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Remove all sealed trees and stored contents.
    ///
    /// Open trees keep their names and are published normally when sealed.
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let mut trees = self.shared.trees.write();
        trees.clear();
        self.shared.blobs.clear();
        self.shared.blob_bytes.store(0, Ordering::Release);
        *self.shared.stats.write() = IndexStats::new();
        drop(trees);

        self.shared.generation.fetch_add(1, Ordering::Release);
        info!("Index cleared");
    }
}

impl IndexBuilder for CodeIndex {
    #[instrument(skip(self, identity), fields(tree = %identity.name))]
    fn open_tree(&self, identity: TreeIdentity) -> Result<Box<dyn TreeHandle>> {
        if identity.name.trim().is_empty() {
            return Err(GroveError::InvalidTreeName {
                name: identity.name,
                reason: "name must not be empty".to_string(),
            });
        }

        let ticket = self.shared.next_ticket.fetch_add(1, Ordering::Relaxed);
        match self.shared.open.entry(identity.name.clone()) {
            Entry::Occupied(_) => {
                return Err(GroveError::NameCollision {
                    name: identity.name,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(ticket);
            }
        }

        info!(tree = %identity.name, "Opened tree");

        Ok(Box::new(MemoryTreeHandle {
            shared: Arc::clone(&self.shared),
            identity,
            ticket,
            pending: Vec::new(),
            pending_bytes: 0,
            sealed: false,
        }))
    }
}

impl IndexShared {
    /// Return the shared copy of `content`, storing it if unseen.
    fn intern(&self, content: Vec<u8>) -> Arc<[u8]> {
        if let Some(existing) = self.blobs.get(content.as_slice()) {
            return Arc::clone(existing.key());
        }

        let blob: Arc<[u8]> = Arc::from(content);
        match self.blobs.entry(Arc::clone(&blob)) {
            Entry::Occupied(slot) => Arc::clone(slot.key()),
            Entry::Vacant(slot) => {
                self.blob_bytes
                    .fetch_add(blob.len() as u64, Ordering::AcqRel);
                slot.insert(());
                blob
            }
        }
    }

    /// Release a name claim, unless another handle has taken it since.
    fn release(&self, name: &str, ticket: u64) {
        self.open.remove_if(name, |_, held| *held == ticket);
    }
}

/// Tree handle produced by [`CodeIndex`].
///
/// Registrations accumulate in the handle and are published as one tree on
/// `finalize`. Dropping an unsealed handle discards its files and releases
/// the name.
struct MemoryTreeHandle {
    shared: Arc<IndexShared>,
    identity: TreeIdentity,
    ticket: u64,
    pending: Vec<FileRecord>,
    pending_bytes: u64,
    sealed: bool,
}

impl TreeHandle for MemoryTreeHandle {
    fn identity(&self) -> &TreeIdentity {
        &self.identity
    }

    fn register(&mut self, record: FileRecord) -> Result<()> {
        if self.sealed {
            return Err(GroveError::AlreadySealed {
                name: self.identity.name.clone(),
            });
        }

        debug!(tree = %self.identity.name, path = %record.path, bytes = record.len(), "Registering file");
        self.pending_bytes += record.len();
        self.pending.push(record);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if self.sealed {
            return Ok(());
        }
        self.sealed = true;

        let shared = &self.shared;
        let files: Vec<IndexedFile> = self
            .pending
            .drain(..)
            .map(|record| IndexedFile {
                path: record.path,
                content: shared.intern(record.content),
            })
            .collect();
        let file_count = files.len() as u64;

        let tree = Arc::new(IndexedTree {
            identity: self.identity.clone(),
            files,
            sealed_at: Utc::now(),
        });

        {
            let mut trees = shared.trees.write();
            let mut stats = shared.stats.write();
            trees.push(tree);
            stats.tree_count += 1;
            stats.file_count += file_count;
            stats.total_bytes += self.pending_bytes;
            stats.last_updated = Some(Utc::now());
        }

        shared.release(&self.identity.name, self.ticket);
        shared.generation.fetch_add(1, Ordering::Release);

        info!(
            tree = %self.identity.name,
            files = file_count,
            bytes = self.pending_bytes,
            "Sealed tree"
        );
        Ok(())
    }

    fn is_sealed(&self) -> bool {
        self.sealed
    }
}

impl Drop for MemoryTreeHandle {
    fn drop(&mut self) {
        if !self.sealed {
            warn!(
                tree = %self.identity.name,
                discarded = self.pending.len(),
                "Tree handle dropped without being sealed"
            );
            self.shared.release(&self.identity.name, self.ticket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_open_register_finalize() {
        let index = CodeIndex::new();
        let meta = serde_json::json!({ "commit": "deadbeef" });
        let mut handle = index
            .open_tree(TreeIdentity::new("repo").with_metadata(meta.clone()))
            .unwrap();

        handle.register(FileRecord::new("b.txt", "second")).unwrap();
        handle.register(FileRecord::new("a.txt", "first")).unwrap();

        // Nothing is visible until the tree is sealed
        assert!(index.is_empty());
        assert!(index.is_open("repo"));

        handle.finalize().unwrap();
        assert!(handle.is_sealed());
        assert!(!index.is_open("repo"));

        let tree = index.tree("repo").unwrap();
        assert_eq!(tree.paths().collect::<Vec<_>>(), vec!["b.txt", "a.txt"]);
        assert_eq!(tree.file("a.txt").unwrap().text(), Some("first"));
        assert_eq!(tree.identity.metadata, Some(meta));
        assert_eq!(tree.total_bytes(), 11);
    }

    #[test]
    fn test_name_collision() {
        let index = CodeIndex::new();
        let _first = index.open_tree(TreeIdentity::new("repo")).unwrap();

        let err = index.open_tree(TreeIdentity::new("repo")).err().unwrap();
        assert!(matches!(err, GroveError::NameCollision { .. }));

        // A different name is fine
        assert!(index.open_tree(TreeIdentity::new("other")).is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let index = CodeIndex::new();
        let err = index.open_tree(TreeIdentity::new("  ")).err().unwrap();
        assert!(matches!(err, GroveError::InvalidTreeName { .. }));
        assert!(index.open_trees().is_empty());
    }

    #[test]
    fn test_name_reusable_after_seal() {
        let index = CodeIndex::new();
        let mut first = index.open_tree(TreeIdentity::new("repo")).unwrap();
        first.register(FileRecord::new("v1", "one")).unwrap();
        first.finalize().unwrap();

        let mut second = index.open_tree(TreeIdentity::new("repo")).unwrap();
        second.register(FileRecord::new("v2", "two")).unwrap();
        second.finalize().unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.tree("repo").unwrap().paths().collect::<Vec<_>>(), vec!["v2"]);
    }

    #[test]
    fn test_register_after_seal_rejected() {
        let index = CodeIndex::new();
        let mut handle = index.open_tree(TreeIdentity::new("repo")).unwrap();
        handle.finalize().unwrap();

        let err = handle.register(FileRecord::new("late", "x")).unwrap_err();
        assert!(matches!(err, GroveError::AlreadySealed { .. }));
    }

    #[test]
    fn test_finalize_idempotent() {
        let index = CodeIndex::new();
        let mut handle = index.open_tree(TreeIdentity::new("repo")).unwrap();
        handle.register(FileRecord::new("a", "x")).unwrap();
        handle.finalize().unwrap();
        let generation = index.generation();

        handle.finalize().unwrap();
        handle.finalize().unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.stats().file_count, 1);
        assert_eq!(index.generation(), generation);
    }

    #[test]
    fn test_drop_unsealed_releases_name() {
        let index = CodeIndex::new();
        {
            let mut handle = index.open_tree(TreeIdentity::new("repo")).unwrap();
            handle.register(FileRecord::new("a", "x")).unwrap();
        }

        assert!(!index.is_open("repo"));
        assert!(index.is_empty());
        assert!(index.open_tree(TreeIdentity::new("repo")).is_ok());
    }

    #[test]
    fn test_empty_tree_is_valid() {
        let index = CodeIndex::new();
        let mut handle = index.open_tree(TreeIdentity::new("empty")).unwrap();
        handle.finalize().unwrap();

        let tree = index.tree("empty").unwrap();
        assert!(tree.is_empty());
        assert_eq!(index.stats().tree_count, 1);
    }

    #[test]
    fn test_content_deduplication() {
        let index = CodeIndex::new();
        for name in ["one", "two"] {
            let mut handle = index.open_tree(TreeIdentity::new(name)).unwrap();
            handle.register(FileRecord::new("LICENSE", "same text")).unwrap();
            handle.register(FileRecord::new(name, name)).unwrap();
            handle.finalize().unwrap();
        }

        let one = index.tree("one").unwrap();
        let two = index.tree("two").unwrap();
        assert!(Arc::ptr_eq(
            &one.file("LICENSE").unwrap().content,
            &two.file("LICENSE").unwrap().content
        ));

        let stats = index.stats();
        assert_eq!(stats.file_count, 4);
        assert_eq!(stats.unique_blobs, 3);
        assert_eq!(stats.total_bytes, 9 + 9 + 3 + 3);
        assert_eq!(stats.unique_bytes, 9 + 3 + 3);
    }

    #[test]
    fn test_concurrent_trees() {
        let index = Arc::new(CodeIndex::new());

        let workers: Vec<_> = (0..8)
            .map(|n| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    let name = format!("tree-{}", n);
                    let mut handle = index.open_tree(TreeIdentity::new(name.clone())).unwrap();
                    for i in 0..50 {
                        handle
                            .register(FileRecord::new(format!("f{:02}", i), format!("{}:{}", name, i)))
                            .unwrap();
                    }
                    handle.finalize().unwrap();
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(index.len(), 8);
        assert!(index.open_trees().is_empty());
        for n in 0..8 {
            let tree = index.tree(&format!("tree-{}", n)).unwrap();
            assert_eq!(tree.len(), 50);
            assert_eq!(tree.files[7].path, "f07");
            assert_eq!(tree.files[7].text().unwrap(), format!("tree-{}:7", n));
        }
    }

    #[test]
    fn test_clear() {
        let index = CodeIndex::new();
        let mut handle = index.open_tree(TreeIdentity::new("repo")).unwrap();
        handle.register(FileRecord::new("a", "x")).unwrap();
        handle.finalize().unwrap();

        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.stats().unique_blobs, 0);
        assert_eq!(index.stats().file_count, 0);
    }
}
