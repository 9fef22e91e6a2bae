//! # Grove Core Library
//!
//! This crate registers the files of source trees with a full-text code
//! search index. Each walk turns one repository checkout into one named,
//! immutable tree of the index.
//!
//! ## Architecture
//!
//! - **Builder** (`builder`): Traits at the seam with the index builder
//! - **Index** (`index`): In-memory index builder with content deduplication
//! - **Indexer** (`indexer`): Filesystem traversal, ordering and registration
//! - **Classify** (`classify`): Size and binary-content policy over byte buffers
//! - **Types** (`types`): Identities, records and walk reports
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust,ignore
//! use grove_core::{CodeIndex, FsIndexer, TreeIdentity, WalkOptions};
//!
//! let index = CodeIndex::new();
//! let identity = TreeIdentity::new("linux")
//!     .with_metadata(serde_json::json!({ "commit": "v6.9" }));
//!
//! let mut indexer = FsIndexer::new(&index, "/src/linux", identity, WalkOptions::default())?;
//! let report = indexer.walk_dir("")?;
//! indexer.finish()?;
//!
//! println!("{} files registered", report.registered);
//! ```

pub mod builder;
pub mod classify;
pub mod config;
pub mod error;
pub mod index;
pub mod indexer;
pub mod types;

// Re-export commonly used types
pub use builder::{IndexBuilder, LoggingProgress, TreeHandle, WalkProgress};
pub use classify::{Classification, ContentPolicy};
pub use config::Config;
pub use error::{GroveError, Result};
pub use index::{CodeIndex, IndexedFile, IndexedTree};
pub use indexer::{FileSelection, FsIndexer, WalkOptions};
pub use types::{
    CandidateEntry, EntryKind, FileRecord, IndexStats, SkipReason, SkippedEntry, TreeIdentity,
    WalkReport,
};
