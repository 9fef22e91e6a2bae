//! Filesystem indexer.
//!
//! An `FsIndexer` registers the files of one repository checkout as one tree
//! of an index. The lifecycle is a single linear pass:
//!
//! ```text
//! new() ──> open tree ──> walk() ──> N registrations ──> finish() / drop ──> sealed
//! ```
//!
//! Candidates come from a [`FileSelection`]: an explicit ordered list, or a
//! recursive discovery that visits directory entries sorted by name,
//! depth-first, without following symlinks. Both selections share the same
//! classification, so a file is accepted or rejected for the same reasons
//! whichever way it was found.
//!
//! Per-file problems (unreadable, vanished, too large, binary) are recorded
//! in the [`WalkReport`] and never stop the walk. The tree is sealed exactly
//! once, on `finish()` or when the indexer is dropped, whatever happened
//! during the walk.

use crate::builder::{IndexBuilder, TreeHandle, WalkProgress};
use crate::classify::ContentPolicy;
use crate::error::{GroveError, Result};
use crate::types::{
    CandidateEntry, EntryKind, FileRecord, SkipReason, SkippedEntry, TreeIdentity, WalkReport,
};
use ignore::WalkBuilder;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Version control metadata directories skipped by recursive walks.
pub const DEFAULT_SKIP_DIRS: &[&str] = &[".git", ".hg", ".svn", ".bzr"];

/// Where a walk gets its candidates from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSelection {
    /// Paths relative to the repository root, registered in this order
    Explicit(Vec<PathBuf>),

    /// Recursive discovery from a path relative to the repository root
    /// (empty or `.` for the root itself)
    Recursive(PathBuf),
}

/// Options controlling which files a walk accepts.
#[derive(Clone)]
pub struct WalkOptions {
    policy: ContentPolicy,
    skip_dirs: Vec<String>,
    exclude: Vec<glob::Pattern>,
    skip_hidden: bool,
    respect_gitignore: bool,
    progress: Option<Arc<dyn WalkProgress>>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions {
            policy: ContentPolicy::default(),
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|d| d.to_string()).collect(),
            exclude: Vec::new(),
            skip_hidden: false,
            respect_gitignore: false,
            progress: None,
        }
    }
}

impl fmt::Debug for WalkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalkOptions")
            .field("policy", &self.policy)
            .field("skip_dirs", &self.skip_dirs)
            .field(
                "exclude",
                &self.exclude.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            )
            .field("skip_hidden", &self.skip_hidden)
            .field("respect_gitignore", &self.respect_gitignore)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl WalkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: ContentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.policy.max_file_size = size;
        self
    }

    pub fn with_sniff_len(mut self, len: usize) -> Self {
        self.policy.sniff_len = len;
        self
    }

    pub fn with_max_non_text_ratio(mut self, ratio: f64) -> Self {
        self.policy.max_non_text_ratio = ratio;
        self
    }

    pub fn with_skip_dirs(mut self, dirs: Vec<String>) -> Self {
        self.skip_dirs = dirs;
        self
    }

    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    pub fn with_respect_gitignore(mut self, respect: bool) -> Self {
        self.respect_gitignore = respect;
        self
    }

    /// Set glob exclusion patterns, matched against relative paths.
    pub fn with_exclude<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude = patterns
            .into_iter()
            .map(|p| {
                glob::Pattern::new(p.as_ref()).map_err(|e| {
                    GroveError::config(format!("invalid exclude pattern {:?}: {}", p.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self)
    }

    pub fn with_progress(mut self, progress: Arc<dyn WalkProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn policy(&self) -> &ContentPolicy {
        &self.policy
    }

    fn is_excluded(&self, rel: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(rel))
    }
}

/// Registers one repository checkout as one tree.
pub struct FsIndexer {
    root: PathBuf,
    name: String,
    options: WalkOptions,
    handle: Option<Box<dyn TreeHandle>>,
    walked: bool,
}

impl FsIndexer {
    /// Validate the repository root and open a tree for it.
    ///
    /// No tree is opened if the root is missing or not a directory.
    pub fn new(
        builder: &dyn IndexBuilder,
        root: impl Into<PathBuf>,
        identity: TreeIdentity,
        options: WalkOptions,
    ) -> Result<Self> {
        let root = root.into();
        let metadata = match fs::metadata(&root) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(GroveError::RootNotFound { path: root })
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_dir() {
            return Err(GroveError::RootNotDirectory { path: root });
        }

        let handle = builder.open_tree(identity)?;
        let name = handle.identity().name.clone();

        info!(tree = %name, root = %root.display(), "Indexer ready");

        Ok(FsIndexer {
            root,
            name,
            options,
            handle: Some(handle),
            walked: false,
        })
    }

    /// Repository root this indexer reads from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the tree being registered
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// Whether the tree has been sealed
    pub fn is_sealed(&self) -> bool {
        self.handle.is_none()
    }

    /// Register the files named by `paths`, in that order.
    pub fn walk_paths<I, P>(&mut self, paths: I) -> Result<WalkReport>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.walk(FileSelection::Explicit(
            paths.into_iter().map(Into::into).collect(),
        ))
    }

    /// Register every eligible file below `start`.
    pub fn walk_dir(&mut self, start: impl Into<PathBuf>) -> Result<WalkReport> {
        self.walk(FileSelection::Recursive(start.into()))
    }

    /// Discover, classify and register candidates from `selection`.
    ///
    /// Only one walk is allowed per indexer. An `Err` means the walk could
    /// not start or the builder rejected a registration; per-file problems
    /// are in the returned report instead.
    #[instrument(skip(self, selection), fields(tree = %self.name))]
    pub fn walk(&mut self, selection: FileSelection) -> Result<WalkReport> {
        if self.walked {
            return Err(GroveError::AlreadyWalked {
                name: self.name.clone(),
            });
        }
        self.walked = true;

        let handle = self
            .handle
            .as_deref_mut()
            .ok_or_else(|| GroveError::AlreadySealed {
                name: self.name.clone(),
            })?;

        let mut walk = Walk {
            root: &self.root,
            options: &self.options,
            handle,
            report: WalkReport::new(),
        };

        match selection {
            FileSelection::Explicit(paths) => {
                for path in &paths {
                    walk.visit_listed(path)?;
                }
            }
            FileSelection::Recursive(start) => walk.discover(&start)?,
        }

        let report = walk.report;
        if let Some(progress) = &self.options.progress {
            progress.on_complete(&report);
        }
        info!(
            tree = %self.name,
            files = report.registered,
            bytes = report.registered_bytes,
            skipped = report.skipped_count(),
            "Walk finished"
        );
        Ok(report)
    }

    /// Seal the tree, surfacing any builder error.
    pub fn finish(mut self) -> Result<()> {
        self.seal()
    }

    fn seal(&mut self) -> Result<()> {
        if let Some(mut handle) = self.handle.take() {
            handle.finalize()?;
            info!(tree = %self.name, "Tree sealed");
        }
        Ok(())
    }
}

impl Drop for FsIndexer {
    fn drop(&mut self) {
        if let Err(err) = self.seal() {
            warn!(tree = %self.name, error = %err, "Failed to seal tree");
        }
    }
}

/// State of one walk in progress.
struct Walk<'a> {
    root: &'a Path,
    options: &'a WalkOptions,
    handle: &'a mut dyn TreeHandle,
    report: WalkReport,
}

impl Walk<'_> {
    /// Handle one caller-supplied path.
    fn visit_listed(&mut self, path: &Path) -> Result<()> {
        let Some(rel) = normalize_relative(self.root, path) else {
            self.skip(path.display().to_string(), SkipReason::OutsideRoot);
            return Ok(());
        };
        let Some(rel_str) = relative_string(&rel) else {
            self.skip(path.display().to_string(), SkipReason::InvalidPath);
            return Ok(());
        };

        if rel.parent().map_or(false, |dir| through_symlink(self.root, dir)) {
            self.skip(rel_str, SkipReason::OutsideRoot);
            return Ok(());
        }

        let full = self.root.join(&rel);
        let kind = match fs::symlink_metadata(&full) {
            Ok(m) => EntryKind::from_file_type(m.file_type()),
            Err(e) => {
                self.skip(rel_str, skip_reason_for(&e));
                return Ok(());
            }
        };

        self.consider(CandidateEntry::new(rel_str, kind), &full)
    }

    /// Recursive discovery from `start`.
    fn discover(&mut self, start: &Path) -> Result<()> {
        let rel_start = normalize_relative(self.root, start).ok_or_else(|| {
            GroveError::InvalidStartPath {
                path: start.to_path_buf(),
            }
        })?;
        if rel_start
            .components()
            .any(|c| self.options.skip_dirs.iter().any(|d| c.as_os_str() == d.as_str()))
        {
            return Err(GroveError::SkippedStartPath {
                path: start.to_path_buf(),
            });
        }
        let start_full = if rel_start.as_os_str().is_empty() {
            self.root.to_path_buf()
        } else {
            self.root.join(&rel_start)
        };
        match fs::symlink_metadata(&start_full) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(GroveError::StartPathNotFound {
                    path: start.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        }
        // The walker would descend into a symlinked start directory
        if through_symlink(self.root, &rel_start) {
            return Err(GroveError::InvalidStartPath {
                path: start.to_path_buf(),
            });
        }

        let respect = self.options.respect_gitignore;
        let skip_dirs = self.options.skip_dirs.clone();

        let mut builder = WalkBuilder::new(&start_full);
        builder
            .standard_filters(false)
            .hidden(self.options.skip_hidden)
            .git_ignore(respect)
            .git_exclude(respect)
            .require_git(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map_or(false, |ft| ft.is_dir());
                !(entry.depth() > 0
                    && is_dir
                    && skip_dirs.iter().any(|d| entry.file_name() == d.as_str()))
            });

        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    let path = error_path(&err)
                        .map(|p| self.display_relative(p))
                        .unwrap_or_default();
                    let reason = match err.io_error() {
                        Some(io_err) => skip_reason_for(io_err),
                        None => SkipReason::Unreadable {
                            error: err.to_string(),
                        },
                    };
                    self.skip(path, reason);
                    continue;
                }
            };

            let kind = entry
                .file_type()
                .map(EntryKind::from_file_type)
                .unwrap_or(EntryKind::Other);
            if entry.depth() == 0 && kind == EntryKind::Dir {
                continue;
            }

            let rel = entry.path().strip_prefix(self.root).unwrap_or(entry.path());
            let Some(rel_str) = relative_string(rel) else {
                self.skip(entry.path().display().to_string(), SkipReason::InvalidPath);
                continue;
            };

            self.consider(CandidateEntry::new(rel_str, kind), entry.path())?;
        }

        Ok(())
    }

    /// Classify one candidate and register it if eligible.
    fn consider(&mut self, candidate: CandidateEntry, full: &Path) -> Result<()> {
        if candidate.kind != EntryKind::File {
            debug!(path = %candidate.path, kind = %candidate.kind, "Not a regular file");
            self.report.not_files += 1;
            return Ok(());
        }
        if self.options.is_excluded(&candidate.path) {
            self.skip(candidate.path, SkipReason::Excluded);
            return Ok(());
        }

        match read_eligible(full, &self.options.policy) {
            Ok(content) => self.register(FileRecord::new(candidate.path, content)),
            Err(reason) => {
                self.skip(candidate.path, reason);
                Ok(())
            }
        }
    }

    fn register(&mut self, record: FileRecord) -> Result<()> {
        let bytes = record.len();
        let path = record.path.clone();

        if let Err(err) = self.handle.register(record) {
            error!(path = %path, error = %err, "Tree rejected registration");
            return Err(err);
        }

        self.report.registered += 1;
        self.report.registered_bytes += bytes;
        if let Some(progress) = &self.options.progress {
            progress.on_registered(&path, bytes);
        }
        Ok(())
    }

    fn skip(&mut self, path: String, reason: SkipReason) {
        match &reason {
            SkipReason::Unreadable { .. } => warn!(path = %path, reason = %reason, "Skipping file"),
            _ => debug!(path = %path, reason = %reason, "Skipping file"),
        }

        let entry = SkippedEntry::new(path, reason);
        if let Some(progress) = &self.options.progress {
            progress.on_skipped(&entry);
        }
        self.report.skipped.push(entry);
    }

    fn display_relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(self.root).unwrap_or(path);
        relative_string(rel).unwrap_or_else(|| rel.display().to_string())
    }
}

/// Read a regular file and apply the content policy.
fn read_eligible(path: &Path, policy: &ContentPolicy) -> std::result::Result<Vec<u8>, SkipReason> {
    let file = File::open(path).map_err(|e| skip_reason_for(&e))?;
    let metadata = file.metadata().map_err(|e| skip_reason_for(&e))?;
    if !metadata.is_file() {
        // Replaced by something else since discovery
        return Err(SkipReason::Vanished);
    }
    if let Some(reason) = policy.check_size(metadata.len()).skip_reason() {
        return Err(reason);
    }

    // The file may grow between stat and read
    let mut content = Vec::with_capacity(metadata.len() as usize);
    file.take(policy.max_file_size.saturating_add(1))
        .read_to_end(&mut content)
        .map_err(|e| skip_reason_for(&e))?;

    match policy.classify(&content).skip_reason() {
        Some(reason) => Err(reason),
        None => Ok(content),
    }
}

fn skip_reason_for(err: &io::Error) -> SkipReason {
    if err.kind() == io::ErrorKind::NotFound {
        SkipReason::Vanished
    } else {
        SkipReason::Unreadable {
            error: err.to_string(),
        }
    }
}

/// Resolve `path` to a path relative to `root` that cannot escape it.
///
/// Absolute paths must lie under `root`. Any `..` component is rejected.
fn normalize_relative(root: &Path, path: &Path) -> Option<PathBuf> {
    let path = if path.is_absolute() {
        path.strip_prefix(root).ok()?
    } else {
        path
    };

    let mut rel = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(rel)
}

/// Whether any component of `rel` below `root` is a symbolic link.
///
/// Components that cannot be stat'ed end the check; the caller's own stat
/// reports them.
fn through_symlink(root: &Path, rel: &Path) -> bool {
    let mut current = root.to_path_buf();
    for component in rel.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(m) if m.file_type().is_symlink() => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
    false
}

/// `/`-separated UTF-8 form of a relative path.
fn relative_string(rel: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_str()?);
        }
    }
    Some(parts.join("/"))
}

fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}
