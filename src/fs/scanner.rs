//! Depth-sharded directory scanner
//!
//! A scan runs in two phases. First the tree is enumerated down to a fixed
//! depth, and every directory found at exactly that depth becomes a shard.
//! Each shard is then listed in full by the worker pool, and the per-shard
//! file lists are flattened into one result.

use crate::config::resolve_threads;
use crate::core::{CancellationToken, WorkerPool};
use crate::error::{IoResultExt, Result, ShardError};
use crate::progress::ProgressReporter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Dispatch;
use walkdir::{DirEntry, WalkDir};

/// Name-based inclusion rules for listed files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    exclude: Vec<String>,
    extensions: Vec<String>,
}

impl FileFilter {
    /// Build a filter. Extensions must carry their leading dot and exclude
    /// terms must be non-empty.
    pub fn new(exclude: Vec<String>, extensions: Vec<String>) -> Result<Self> {
        if exclude.iter().any(|s| s.is_empty()) {
            return Err(ShardError::config("exclude terms must not be empty"));
        }
        for ext in &extensions {
            crate::fs::validate_extension(ext)?;
        }
        Ok(Self { exclude, extensions })
    }

    /// Filter that accepts every file
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Decide whether a file name is kept.
    ///
    /// The decision depends only on `name`, never on which other names are
    /// being filtered alongside it.
    pub fn accepts(&self, name: &str) -> bool {
        if self.exclude.iter().any(|term| name.contains(term.as_str())) {
            return false;
        }
        self.extensions.is_empty() || self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    fn accepts_path(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.accepts(&name.to_string_lossy()))
            .unwrap_or(false)
    }
}

/// One shard of a scan: list every matching file below `path`
#[derive(Debug, Clone)]
pub struct DirectoryScanTask {
    /// Shard root
    pub path: PathBuf,
    /// Rules applied to every file name in the shard
    pub filter: FileFilter,
}

impl DirectoryScanTask {
    /// Create a scan task for one shard
    pub fn new(path: PathBuf, filter: FileFilter) -> Self {
        Self { path, filter }
    }

    /// List the shard; empty shards yield no result
    pub fn execute(&self) -> Result<Option<Vec<PathBuf>>> {
        let files = list_files(&self.path, &self.filter)?;
        Ok(if files.is_empty() { None } else { Some(files) })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_path(path)
}

fn walk_error(fallback: &Path, err: walkdir::Error) -> ShardError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| fallback.to_path_buf());
    match err.into_io_error() {
        Some(io) if io.kind() == std::io::ErrorKind::NotFound => ShardError::NotFound(path),
        Some(io) => ShardError::io(path, io),
        None => ShardError::invalid_path(path, "filesystem loop"),
    }
}

/// Missing roots are `NotFound`; roots that exist but are not directories
/// are `InvalidPath`.
pub(crate) fn require_directory(root: &Path) -> Result<()> {
    if !root.exists() {
        return Err(ShardError::NotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ShardError::invalid_path(root, "not a directory"));
    }
    Ok(())
}

/// Collect the directories exactly `max_depth` levels below `root`.
///
/// Depth 0 yields `root` itself. Directories that cannot be read contribute
/// nothing; the walk never goes deeper than `max_depth`.
pub fn enumerate_directories(root: &Path, max_depth: usize) -> Result<Vec<PathBuf>> {
    require_directory(root)?;
    let root = absolute(root)?;

    let dirs = WalkDir::new(&root)
        .follow_links(true)
        .min_depth(max_depth)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::debug!(path = ?err.path(), error = %err, "skipping unreadable directory");
                None
            }
        })
        .filter(|e| e.file_type().is_dir())
        .map(DirEntry::into_path)
        .collect();

    Ok(dirs)
}

fn is_file_entry(entry: &DirEntry) -> bool {
    entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
}

/// List every file below `directory` that passes `filter`.
///
/// The walk is unbounded within the directory. Failing to open `directory`
/// itself is an error; unreadable entries further down are logged and
/// skipped.
pub fn list_files(directory: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>> {
    let directory = absolute(directory)?;
    let mut candidates = Vec::new();

    for entry in WalkDir::new(&directory) {
        match entry {
            Ok(e) => {
                if is_file_entry(&e) {
                    candidates.push(e.into_path());
                }
            }
            Err(err) if err.depth() == 0 => return Err(walk_error(&directory, err)),
            Err(err) => {
                tracing::warn!(path = ?err.path(), error = %err, "skipping unreadable entry");
            }
        }
    }

    Ok(candidates
        .into_iter()
        .filter(|path| filter.accepts_path(path))
        .collect())
}

/// Configuration for a sharded scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Depth at which the tree is split into shards
    pub max_depth: usize,
    /// Substrings that exclude a file name
    pub exclude_patterns: Vec<String>,
    /// Allowed extensions, with leading dot (empty = all)
    pub extensions: Vec<String>,
    /// Number of worker threads (0 = auto)
    pub threads: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: 1,
            exclude_patterns: Vec::new(),
            extensions: Vec::new(),
            threads: 0,
        }
    }
}

/// Result of a sharded scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Root path that was scanned
    pub root: PathBuf,
    /// Discovered files, in no particular order
    pub files: Vec<PathBuf>,
    /// Number of shards enumerated
    pub shards: usize,
    /// Shards whose listing failed
    pub failed_shards: u64,
    /// Shards not listed because the scan was cancelled
    pub skipped_shards: u64,
    /// Scan duration
    pub scan_duration: Duration,
}

impl ScanResult {
    /// Sort files lexicographically for stable output
    pub fn sort_files(&mut self) {
        self.files.sort();
    }
}

/// Parallel, depth-sharded directory scanner
pub struct Scanner {
    config: ScanConfig,
    filter: FileFilter,
    threads: usize,
    progress: Option<Arc<ProgressReporter>>,
    cancel: CancellationToken,
    dispatch: Dispatch,
}

impl Scanner {
    /// Create a new scanner with the given configuration
    pub fn new(config: ScanConfig) -> Result<Self> {
        let filter = FileFilter::new(config.exclude_patterns.clone(), config.extensions.clone())?;
        let threads = resolve_threads(config.threads);

        Ok(Self {
            config,
            filter,
            threads,
            progress: None,
            cancel: CancellationToken::new(),
            dispatch: tracing::dispatcher::get_default(|d| d.clone()),
        })
    }

    /// Set progress reporter
    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Share a cancellation token with the caller
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Log through an explicit dispatcher
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Enumerate shards under `root` and list them in parallel
    pub fn scan(&self, root: &Path) -> Result<ScanResult> {
        let start_time = Instant::now();

        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info!(root = %root.display(), depth = self.config.max_depth, "listing subdirectories");
        });
        let shards = tracing::dispatcher::with_default(&self.dispatch, || {
            enumerate_directories(root, self.config.max_depth)
        })?;
        let shard_count = shards.len();

        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info!(shards = shard_count, "listing files");
        });

        let tasks: Vec<DirectoryScanTask> = shards
            .into_iter()
            .map(|path| DirectoryScanTask::new(path, self.filter.clone()))
            .collect();

        let mut pool = WorkerPool::new(self.threads)?
            .with_cancellation(self.cancel.clone())
            .with_dispatch(self.dispatch.clone());
        if let Some(progress) = &self.progress {
            progress.set_status("Listing files...");
            pool = pool.with_progress(Arc::clone(progress));
        }

        let outcome = pool.run(tasks, DirectoryScanTask::execute)?;

        Ok(ScanResult {
            root: absolute(root)?,
            files: outcome.results.into_iter().flatten().collect(),
            shards: shard_count,
            failed_shards: outcome.failed,
            skipped_shards: outcome.skipped,
            scan_duration: start_time.elapsed(),
        })
    }
}

/// Find every directory below `root` whose name contains `needle`
pub fn find_subdirectories_containing(root: &Path, needle: &str) -> Result<Vec<PathBuf>> {
    require_directory(root)?;

    Ok(WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter(|e| e.file_name().to_string_lossy().contains(needle))
        .map(DirEntry::into_path)
        .collect())
}
