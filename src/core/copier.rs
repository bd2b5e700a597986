//! Copy orchestration
//!
//! Turns a file list (relative to a source root) or a list of explicit
//! source/destination pairs into copy tasks and runs them on the worker
//! pool. Copies are idempotent: a destination that already exists is left
//! alone, so re-running a batch only fills in what is missing.

use crate::config::{resolve_threads, CopyConfig};
use crate::core::{CancellationToken, WorkerPool};
use crate::error::{Result, ShardError};
use crate::fs::{read_lines, require_directory, rewrite_root, CopyOptions, FileCopier, PlaceOutcome};
use crate::progress::ProgressReporter;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::Dispatch;

/// Where a copy task writes to
#[derive(Debug, Clone)]
pub enum CopyTarget {
    /// Explicit destination path
    Path(PathBuf),
    /// Same relative location under `dst_root` as the source has under `src_root`
    Rebase {
        /// Root the source is expected to live under
        src_root: PathBuf,
        /// Root the destination is placed under
        dst_root: PathBuf,
    },
}

/// A single file copy
#[derive(Debug, Clone)]
pub struct CopyTask {
    /// Source file
    pub source: PathBuf,
    /// Destination rule
    pub target: CopyTarget,
}

/// Per-task result of a successful copy task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Bytes were written to the destination
    Copied {
        /// Size of the copied file
        bytes: u64,
    },
    /// The destination already existed
    AlreadyPresent,
}

impl CopyTask {
    /// Copy `source` to exactly `destination`
    pub fn paired(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: CopyTarget::Path(destination.into()),
        }
    }

    /// Copy a list entry from `src_root` to `dst_root`. Relative entries are
    /// resolved against `src_root`; absolute entries are used as-is.
    pub fn rebased(entry: &Path, src_root: &Path, dst_root: &Path) -> Self {
        let source = if entry.is_absolute() {
            entry.to_path_buf()
        } else {
            src_root.join(entry)
        };

        Self {
            source,
            target: CopyTarget::Rebase {
                src_root: src_root.to_path_buf(),
                dst_root: dst_root.to_path_buf(),
            },
        }
    }

    /// Resolve the destination path
    pub fn destination(&self) -> Result<PathBuf> {
        match &self.target {
            CopyTarget::Path(path) => Ok(path.clone()),
            CopyTarget::Rebase { src_root, dst_root } => rewrite_root(&self.source, src_root, dst_root),
        }
    }

    /// Run the copy. A missing source or an unusable destination is an
    /// error; an existing destination is not.
    pub fn execute(&self, copier: &FileCopier) -> Result<Option<CopyOutcome>> {
        let destination = self.destination()?;
        if !self.source.exists() {
            return Err(ShardError::NotFound(self.source.clone()));
        }

        if destination.exists() {
            tracing::debug!(path = %destination.display(), "destination exists, skipping");
            return Ok(Some(CopyOutcome::AlreadyPresent));
        }

        let outcome = match copier.copy_no_clobber(&self.source, &destination)? {
            PlaceOutcome::Written(stats) => CopyOutcome::Copied {
                bytes: stats.bytes_copied,
            },
            PlaceOutcome::DestinationExists => CopyOutcome::AlreadyPresent,
        };
        Ok(Some(outcome))
    }
}

/// Files to copy in list mode
#[derive(Debug, Clone)]
pub enum FileList {
    /// Paths held in memory
    Paths(Vec<PathBuf>),
    /// Line-delimited text file with one path per line
    ListFile(PathBuf),
}

impl FileList {
    /// Load the entries, reading the list file if there is one
    pub fn resolve(self) -> Result<Vec<PathBuf>> {
        match self {
            FileList::Paths(paths) => Ok(paths),
            FileList::ListFile(path) => Ok(read_lines(&path)?
                .into_iter()
                .map(PathBuf::from)
                .collect()),
        }
    }
}

impl From<Vec<PathBuf>> for FileList {
    fn from(paths: Vec<PathBuf>) -> Self {
        FileList::Paths(paths)
    }
}

impl From<Vec<&str>> for FileList {
    fn from(paths: Vec<&str>) -> Self {
        FileList::Paths(paths.into_iter().map(PathBuf::from).collect())
    }
}

/// Summary of one copy batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct CopyReport {
    /// Copy tasks queued
    pub submitted: u64,
    /// Files written
    pub copied: u64,
    /// Destinations that already existed
    pub already_present: u64,
    /// Tasks that failed (see the error log)
    pub failed: u64,
    /// Tasks not started because the batch was cancelled
    pub skipped: u64,
    /// Total bytes written
    pub bytes_copied: u64,
    /// Batch duration
    pub duration: Duration,
}

impl CopyReport {
    /// Check if every task succeeded
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Copy Summary ===");
        println!("Tasks:           {}", self.submitted);
        println!("Files copied:    {}", self.copied);
        println!("Already present: {}", self.already_present);
        println!("Bytes copied:    {}", humansize::format_size(self.bytes_copied, humansize::BINARY));
        println!("Duration:        {:.2?}", self.duration);

        if self.failed > 0 {
            println!("Failed:          {} (see log)", self.failed);
        }
        if self.skipped > 0 {
            println!("Cancelled:       {}", self.skipped);
        }
    }
}

/// Runs copy batches on a worker pool
pub struct CopyOrchestrator {
    copier: FileCopier,
    threads: usize,
    progress: Option<Arc<ProgressReporter>>,
    cancel: CancellationToken,
    dispatch: Dispatch,
}

impl CopyOrchestrator {
    /// Create a new orchestrator
    pub fn new(config: CopyConfig) -> Self {
        let copy_options = CopyOptions {
            buffer_size: config.buffer_size,
            preserve_permissions: config.preserve_permissions,
            sync: config.sync,
        };

        Self {
            copier: FileCopier::new(copy_options),
            threads: resolve_threads(config.threads),
            progress: None,
            cancel: CancellationToken::new(),
            dispatch: tracing::dispatcher::get_default(|d| d.clone()),
        }
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

    /// Get cancellation token for external control
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Copy every entry of `file_list` from `src_root` to `dst_root`,
    /// keeping relative paths.
    pub fn copy_by_list(
        &self,
        file_list: impl Into<FileList>,
        src_root: &Path,
        dst_root: &Path,
    ) -> Result<CopyReport> {
        require_directory(src_root)?;

        let entries = file_list.into().resolve()?;
        let tasks: Vec<CopyTask> = entries
            .iter()
            .map(|entry| CopyTask::rebased(entry, src_root, dst_root))
            .collect();

        self.log(|| {
            tracing::info!(
                files = tasks.len(),
                src = %src_root.display(),
                dst = %dst_root.display(),
                "copying files"
            )
        });
        self.run(tasks)
    }

    /// Copy `src_paths[i]` to `dst_paths[i]` for every `i`
    pub fn copy_by_pairs(&self, src_paths: Vec<PathBuf>, dst_paths: Vec<PathBuf>) -> Result<CopyReport> {
        if src_paths.len() != dst_paths.len() {
            return Err(ShardError::config(format!(
                "source and destination lists differ in length ({} vs {})",
                src_paths.len(),
                dst_paths.len()
            )));
        }

        let tasks: Vec<CopyTask> = src_paths
            .into_iter()
            .zip(dst_paths)
            .map(|(src, dst)| CopyTask::paired(src, dst))
            .collect();

        self.log(|| tracing::info!(files = tasks.len(), "copying file pairs"));
        self.run(tasks)
    }

    fn log(&self, f: impl FnOnce()) {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    fn run(&self, tasks: Vec<CopyTask>) -> Result<CopyReport> {
        let mut pool = WorkerPool::new(self.threads)?
            .with_cancellation(self.cancel.clone())
            .with_dispatch(self.dispatch.clone());
        if let Some(progress) = &self.progress {
            progress.set_status("Copying files...");
            pool = pool.with_progress(Arc::clone(progress));
        }

        let copier = &self.copier;
        let outcome = pool.run(tasks, |task| task.execute(copier))?;

        let mut report = CopyReport {
            submitted: outcome.submitted,
            failed: outcome.failed,
            skipped: outcome.skipped,
            duration: outcome.duration,
            ..Default::default()
        };
        for result in outcome.results {
            match result {
                CopyOutcome::Copied { bytes } => {
                    report.copied += 1;
                    report.bytes_copied += bytes;
                }
                CopyOutcome::AlreadyPresent => report.already_present += 1,
            }
        }

        self.log(|| {
            tracing::info!(
                copied = report.copied,
                already_present = report.already_present,
                failed = report.failed,
                "copy batch finished"
            )
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::test_support::LogCapture;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn orchestrator() -> CopyOrchestrator {
        CopyOrchestrator::new(CopyConfig {
            threads: 4,
            ..Default::default()
        })
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Relative path -> content for every file under `root`
    fn snapshot(root: &Path) -> BTreeMap<PathBuf, String> {
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
                (rel, std::fs::read_to_string(e.path()).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_copy_by_list() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(&src.path().join("sample.txt"), "This is a test file.");
        write(&src.path().join("nested/deep/x.txt"), "deep");

        let report = orchestrator()
            .copy_by_list(vec!["sample.txt", "nested/deep/x.txt"], src.path(), dst.path())
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.copied, 2);
        assert_eq!(
            std::fs::read_to_string(dst.path().join("sample.txt")).unwrap(),
            "This is a test file."
        );
        assert_eq!(
            std::fs::read_to_string(dst.path().join("nested/deep/x.txt")).unwrap(),
            "deep"
        );
    }

    #[test]
    fn test_missing_source_is_logged_not_raised() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let capture = LogCapture::new();

        let report = orchestrator()
            .with_dispatch(capture.dispatch())
            .copy_by_list(vec!["a.txt"], src.path(), dst.path())
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.copied, 0);
        assert!(snapshot(dst.path()).is_empty());

        let missing = src.path().join("a.txt").display().to_string();
        assert_eq!(capture.count("task failed"), 1);
        assert!(capture.contents().contains(&missing));
    }

    #[test]
    fn test_existing_destination_is_kept() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(&src.path().join("sample.txt"), "This is a test file.");
        write(&dst.path().join("sample.txt"), "Existing file.");

        let report = orchestrator()
            .copy_by_list(vec!["sample.txt"], src.path(), dst.path())
            .unwrap();

        assert_eq!(report.already_present, 1);
        assert_eq!(report.copied, 0);
        assert_eq!(
            std::fs::read_to_string(dst.path().join("sample.txt")).unwrap(),
            "Existing file."
        );
    }

    #[test]
    fn test_second_run_copies_nothing() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let names: Vec<String> = (0..20).map(|i| format!("d{}/f{}.bin", i % 3, i)).collect();
        for name in &names {
            write(&src.path().join(name), name);
        }
        let list: Vec<PathBuf> = names.iter().map(PathBuf::from).collect();

        let first = orchestrator().copy_by_list(list.clone(), src.path(), dst.path()).unwrap();
        let after_first = snapshot(dst.path());
        let second = orchestrator().copy_by_list(list, src.path(), dst.path()).unwrap();

        assert_eq!(first.copied, 20);
        assert_eq!(second.copied, 0);
        assert_eq!(second.bytes_copied, 0);
        assert_eq!(second.already_present, 20);
        assert_eq!(snapshot(dst.path()), after_first);
    }

    #[test]
    fn test_partial_failure_accounting() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let capture = LogCapture::new();

        let mut list = Vec::new();
        for i in 0..10 {
            let name = format!("f{}.txt", i);
            if i % 3 != 0 {
                write(&src.path().join(&name), "data");
            }
            list.push(PathBuf::from(name));
        }

        let report = orchestrator()
            .with_dispatch(capture.dispatch())
            .copy_by_list(list, src.path(), dst.path())
            .unwrap();

        // f0, f3, f6, f9 are missing
        assert_eq!(report.submitted, 10);
        assert_eq!(report.copied, 6);
        assert_eq!(report.failed, 4);
        assert_eq!(snapshot(dst.path()).len(), 6);
        assert_eq!(capture.count("task failed"), 4);
    }

    #[test]
    fn test_permuted_list_gives_same_tree() {
        let src = TempDir::new().unwrap();
        let names: Vec<PathBuf> = (0..12).map(|i| PathBuf::from(format!("s{}/n{}.txt", i % 4, i))).collect();
        for name in &names {
            write(&src.path().join(name), &name.display().to_string());
        }

        let dst_a = TempDir::new().unwrap();
        let dst_b = TempDir::new().unwrap();
        let mut reversed = names.clone();
        reversed.reverse();

        orchestrator().copy_by_list(names, src.path(), dst_a.path()).unwrap();
        orchestrator().copy_by_list(reversed, src.path(), dst_b.path()).unwrap();
        assert_eq!(snapshot(dst_a.path()), snapshot(dst_b.path()));
    }

    #[test]
    fn test_list_file_mode() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let lists = TempDir::new().unwrap();
        write(&src.path().join("a/1.png"), "1");
        write(&src.path().join("b/2.png"), "2");
        let list = lists.path().join("files.txt");
        std::fs::write(&list, "a/1.png\nb/2.png\n").unwrap();

        let report = orchestrator()
            .copy_by_list(FileList::ListFile(list), src.path(), dst.path())
            .unwrap();
        assert_eq!(report.copied, 2);
        assert!(dst.path().join("b/2.png").exists());
    }

    #[test]
    fn test_absolute_entries() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        write(&src.path().join("in/x.txt"), "x");
        write(&elsewhere.path().join("y.txt"), "y");

        let report = orchestrator()
            .copy_by_list(
                vec![src.path().join("in/x.txt"), elsewhere.path().join("y.txt")],
                src.path(),
                dst.path(),
            )
            .unwrap();

        assert_eq!(report.copied, 1);
        assert_eq!(report.failed, 1);
        assert!(dst.path().join("in/x.txt").exists());
    }

    #[test]
    fn test_preconditions_fail_fast() {
        let dst = TempDir::new().unwrap();
        let missing_root = dst.path().join("no_such_src");

        let err = orchestrator()
            .copy_by_list(vec!["a.txt"], &missing_root, dst.path())
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::PathNotFound);

        let err = orchestrator()
            .copy_by_list(FileList::ListFile(dst.path().join("list.txt")), dst.path(), dst.path())
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::PathNotFound);

        let file_root = dst.path().join("plain.txt");
        std::fs::write(&file_root, "not a dir").unwrap();
        let err = orchestrator()
            .copy_by_list(vec!["a.txt"], &file_root, dst.path())
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);

        let err = orchestrator()
            .copy_by_pairs(vec![PathBuf::from("/a")], Vec::new())
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[test]
    fn test_parent_components_cannot_leave_destination() {
        let base = TempDir::new().unwrap();
        let src = base.path().join("S");
        let dst = base.path().join("D");
        std::fs::create_dir_all(&src).unwrap();
        write(&base.path().join("secret.txt"), "secret");
        write(&src.join("a/ok.txt"), "ok");
        let capture = LogCapture::new();

        let report = orchestrator()
            .with_dispatch(capture.dispatch())
            .copy_by_list(
                vec![
                    PathBuf::from("../secret.txt"),
                    PathBuf::from("a/../../secret.txt"),
                    src.join("../secret.txt"),
                    PathBuf::from("a/ok.txt"),
                ],
                &src,
                &dst,
            )
            .unwrap();

        assert_eq!(report.copied, 1);
        assert_eq!(report.already_present, 0);
        assert_eq!(report.failed, 3);
        assert_eq!(capture.count("task failed"), 3);
        assert_eq!(snapshot(&dst).len(), 1);
        assert_eq!(std::fs::read_to_string(base.path().join("secret.txt")).unwrap(), "secret");
    }

    #[test]
    fn test_oversized_buffer_does_not_abort_batch() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(&src.path().join("a.txt"), "a");

        let report = CopyOrchestrator::new(CopyConfig {
            threads: 2,
            buffer_size: usize::MAX / 2,
            ..Default::default()
        })
        .copy_by_list(vec!["a.txt"], src.path(), dst.path())
        .unwrap();

        assert_eq!(report.copied, 1);
        assert_eq!(std::fs::read_to_string(dst.path().join("a.txt")).unwrap(), "a");
    }

    #[test]
    fn test_copy_by_pairs() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(&src.path().join("one.txt"), "1");
        write(&src.path().join("two.txt"), "2");

        let report = orchestrator()
            .copy_by_pairs(
                vec![
                    src.path().join("one.txt"),
                    src.path().join("two.txt"),
                    src.path().join("three.txt"),
                ],
                vec![
                    dst.path().join("x/uno.txt"),
                    dst.path().join("y/dos.txt"),
                    dst.path().join("z/tres.txt"),
                ],
            )
            .unwrap();

        assert_eq!(report.copied, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(std::fs::read_to_string(dst.path().join("y/dos.txt")).unwrap(), "2");
        assert!(!dst.path().join("z").exists());
    }

    #[test]
    fn test_cancelled_batch_writes_nothing() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(&src.path().join("a.txt"), "a");

        let copier = orchestrator();
        copier.cancellation_token().cancel();
        let report = copier.copy_by_list(vec!["a.txt"], src.path(), dst.path()).unwrap();

        assert_eq!(report.skipped, 1);
        assert!(!report.is_success());
        assert!(snapshot(dst.path()).is_empty());
    }
}
