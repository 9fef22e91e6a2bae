//! Core data types for Grove.
//!
//! These types flow between the filesystem indexer and the index builder:
//!
//! - **Identity**: which tree a walk is registering into
//! - **Candidates and records**: what the walk discovered and what it hands over
//! - **Reports**: what happened to every candidate that was not registered

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::FileType;

/// Name and metadata of one logical tree in the index.
///
/// The metadata document (commit hash, branch, author, ...) is attached
/// verbatim and never interpreted by Grove.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeIdentity {
    /// Tree name, unique among the trees currently open in an index
    pub name: String,

    /// Opaque structured metadata
    pub metadata: Option<serde_json::Value>,
}

impl TreeIdentity {
    /// Create an identity with no metadata
    pub fn new(name: impl Into<String>) -> Self {
        TreeIdentity {
            name: name.into(),
            metadata: None,
        }
    }

    /// Attach a metadata document
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl fmt::Display for TreeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Kind of a filesystem entry, as seen without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    /// Devices, sockets, FIFOs
    Other,
}

impl EntryKind {
    /// Classify a `FileType` obtained from `symlink_metadata` or a directory entry
    pub fn from_file_type(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Dir => write!(f, "directory"),
            EntryKind::Symlink => write!(f, "symlink"),
            EntryKind::Other => write!(f, "other"),
        }
    }
}

/// One filesystem entry considered during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEntry {
    /// Path relative to the repository root, `/`-separated
    pub path: String,

    /// Entry kind, symlinks not followed
    pub kind: EntryKind,
}

impl CandidateEntry {
    pub fn new(path: impl Into<String>, kind: EntryKind) -> Self {
        CandidateEntry {
            path: path.into(),
            kind,
        }
    }
}

/// A file accepted for registration: relative path plus full content.
///
/// Ownership of the content moves into the tree handle on registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the repository root, `/`-separated
    pub path: String,

    /// Raw file content
    pub content: Vec<u8>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        FileRecord {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Content length in bytes
    pub fn len(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Why a candidate was not registered.
///
/// None of these abort a walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The file could not be opened or read
    Unreadable { error: String },

    /// The entry disappeared between discovery and read
    Vanished,

    /// The file is larger than the configured limit
    TooLarge { size: u64, limit: u64 },

    /// The content looks like binary data
    Binary,

    /// The path matched an exclusion pattern
    Excluded,

    /// The path resolves outside the repository root
    OutsideRoot,

    /// The path is not valid UTF-8
    InvalidPath,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreadable { error } => write!(f, "unreadable: {}", error),
            SkipReason::Vanished => write!(f, "vanished"),
            SkipReason::TooLarge { size, limit } => {
                write!(f, "too large: {} bytes (limit {})", size, limit)
            }
            SkipReason::Binary => write!(f, "binary"),
            SkipReason::Excluded => write!(f, "excluded"),
            SkipReason::OutsideRoot => write!(f, "outside root"),
            SkipReason::InvalidPath => write!(f, "invalid path"),
        }
    }
}

/// A candidate that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    /// Path as the walk saw it, relative to the repository root when possible
    pub path: String,

    #[serde(flatten)]
    pub reason: SkipReason,
}

impl SkippedEntry {
    pub fn new(path: impl Into<String>, reason: SkipReason) -> Self {
        SkippedEntry {
            path: path.into(),
            reason,
        }
    }
}

/// Outcome of one walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkReport {
    /// Number of files registered with the tree
    pub registered: u64,

    /// Total content bytes registered
    pub registered_bytes: u64,

    /// Directories, symlinks and special files passed over
    pub not_files: u64,

    /// Candidates skipped for a per-file reason, in traversal order
    pub skipped: Vec<SkippedEntry>,
}

impl WalkReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of skipped candidates
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Number of skipped candidates matching a predicate on the reason
    pub fn count_skipped(&self, pred: impl Fn(&SkipReason) -> bool) -> usize {
        self.skipped.iter().filter(|s| pred(&s.reason)).count()
    }
}

/// Statistics about the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of sealed trees
    pub tree_count: u64,

    /// Number of files across all sealed trees
    pub file_count: u64,

    /// Content bytes across all sealed trees, counting duplicates
    pub total_bytes: u64,

    /// Number of distinct file contents stored
    pub unique_blobs: u64,

    /// Bytes actually stored after content deduplication
    pub unique_bytes: u64,

    /// When a tree was last sealed
    pub last_updated: Option<DateTime<Utc>>,
}

impl IndexStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of registered bytes saved by deduplication (0.0 when empty)
    pub fn dedup_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        1.0 - (self.unique_bytes as f64 / self.total_bytes as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_identity() {
        let id = TreeIdentity::new("linux")
            .with_metadata(serde_json::json!({ "commit": "abc123" }));
        assert_eq!(id.name, "linux");
        assert_eq!(id.metadata.unwrap()["commit"], "abc123");
    }

    #[test]
    fn test_skip_reason_serialization() {
        let entry = SkippedEntry::new(
            "big.log",
            SkipReason::TooLarge {
                size: 10,
                limit: 5,
            },
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["path"], "big.log");
        assert_eq!(json["reason"], "too_large");
        assert_eq!(json["size"], 10);
    }

    #[test]
    fn test_report_counts() {
        let mut report = WalkReport::new();
        report.skipped.push(SkippedEntry::new("a", SkipReason::Binary));
        report.skipped.push(SkippedEntry::new("b", SkipReason::Vanished));
        report.skipped.push(SkippedEntry::new("c", SkipReason::Binary));

        assert_eq!(report.skipped_count(), 3);
        assert_eq!(report.count_skipped(|r| *r == SkipReason::Binary), 2);
    }

    #[test]
    fn test_dedup_ratio() {
        let mut stats = IndexStats::new();
        assert_eq!(stats.dedup_ratio(), 0.0);

        stats.total_bytes = 100;
        stats.unique_bytes = 25;
        assert!((stats.dedup_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
