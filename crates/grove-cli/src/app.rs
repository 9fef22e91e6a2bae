//! Application state management.

use grove_core::{
    CodeIndex, Config, FileSelection, FsIndexer, LoggingProgress, TreeIdentity, WalkOptions,
    WalkReport,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: Config,

    /// The code index trees are registered into
    pub index: Arc<CodeIndex>,
}

impl App {
    /// Create a new application instance.
    pub fn new(config: Config) -> Self {
        App {
            config,
            index: Arc::new(CodeIndex::new()),
        }
    }

    /// Walk options from the configuration, with command-line overrides.
    pub fn walk_options(&self, tree: &str, max_file_size: Option<u64>) -> anyhow::Result<WalkOptions> {
        let mut options = self
            .config
            .walk
            .to_options()?
            .with_progress(Arc::new(LoggingProgress::new(tree)));
        if let Some(size) = max_file_size {
            options = options.with_max_file_size(size);
        }
        Ok(options)
    }

    /// Register one tree and seal it.
    pub fn index_tree(
        &self,
        root: &Path,
        identity: TreeIdentity,
        selection: FileSelection,
        options: WalkOptions,
    ) -> anyhow::Result<WalkReport> {
        info!(root = %root.display(), tree = %identity.name, "Indexing tree");

        let mut indexer = FsIndexer::new(self.index.as_ref(), root, identity, options)?;
        let report = indexer.walk(selection)?;
        indexer.finish()?;

        Ok(report)
    }
}
