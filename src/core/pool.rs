//! Bounded worker pool
//!
//! Runs a batch of independent tasks on a fixed number of OS threads:
//! - All tasks are queued up front on one MPMC channel
//! - Workers pull until the queue is drained or the batch is cancelled
//! - A failing or panicking task is logged and counted, never propagated
//!
//! The pool lives for exactly one batch: [`WorkerPool::run`] consumes it and
//! returns only after every worker thread has been joined.

use crate::error::{Result, ShardError};
use crate::progress::ProgressReporter;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::Dispatch;

/// Cooperative cancellation flag shared between a pool and its caller.
///
/// Cancelling stops workers from dequeuing further tasks. Tasks already
/// running are allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, untriggered token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Live counters for a running batch
#[derive(Debug, Default)]
pub struct PoolStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl PoolStats {
    /// Tasks queued for the batch
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Tasks whose worker returned successfully
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Tasks whose worker returned an error or panicked
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Tasks finished either way. Never decreases during a batch.
    pub fn finished(&self) -> u64 {
        self.completed() + self.failed()
    }
}

/// Result of one batch
#[derive(Debug)]
pub struct BatchOutcome<R> {
    /// Non-empty worker results, in completion order
    pub results: Vec<R>,
    /// Tasks queued
    pub submitted: u64,
    /// Tasks that succeeded
    pub completed: u64,
    /// Tasks that failed (logged)
    pub failed: u64,
    /// Tasks never started because the batch was cancelled
    pub skipped: u64,
    /// Wall-clock time of the batch
    pub duration: Duration,
}

impl<R> BatchOutcome<R> {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            submitted: 0,
            completed: 0,
            failed: 0,
            skipped: 0,
            duration: Duration::ZERO,
        }
    }
}

/// Fixed-size pool of worker threads for one batch
pub struct WorkerPool {
    workers: usize,
    progress: Option<Arc<ProgressReporter>>,
    cancel: CancellationToken,
    dispatch: Dispatch,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Create a pool with `workers` threads. Zero workers is rejected.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(ShardError::config("worker count must be at least 1"));
        }

        Ok(Self {
            workers,
            progress: None,
            cancel: CancellationToken::new(),
            dispatch: tracing::dispatcher::get_default(|d| d.clone()),
            stats: Arc::new(PoolStats::default()),
        })
    }

    /// Report finished tasks to a progress bar
    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Share a cancellation token with the caller
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Log task failures through `dispatch` instead of the dispatcher that
    /// was current when the pool was created
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Handle to the live counters, readable while `run` is in progress
    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// Token that cancels this pool's batch
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `worker` over every task and collect the `Some` results.
    ///
    /// Blocks until each task has completed, failed or been skipped due to
    /// cancellation. Only thread start-up failures are returned as errors.
    pub fn run<T, R, F>(self, tasks: Vec<T>, worker: F) -> Result<BatchOutcome<R>>
    where
        T: Send + fmt::Debug,
        R: Send,
        F: Fn(&T) -> Result<Option<R>> + Sync,
    {
        let start = Instant::now();
        let total = tasks.len();

        self.stats.submitted.store(total as u64, Ordering::Relaxed);
        if let Some(progress) = &self.progress {
            progress.set_total_tasks(total as u64);
        }

        if total == 0 {
            return Ok(BatchOutcome::empty());
        }

        let (task_tx, task_rx) = unbounded();
        for task in tasks {
            task_tx
                .send(task)
                .map_err(|_| ShardError::ThreadPoolError("Failed to queue task".to_string()))?;
        }
        drop(task_tx);

        let (result_tx, result_rx) = unbounded();
        let threads = self.workers.min(total);

        tracing::debug!(tasks = total, threads, "starting batch");

        let ctx = WorkerContext {
            stats: &self.stats,
            progress: self.progress.as_deref(),
            cancel: &self.cancel,
            dispatch: &self.dispatch,
        };

        thread::scope(|scope| -> Result<()> {
            for worker_id in 0..threads {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let worker = &worker;
                let ctx = &ctx;

                thread::Builder::new()
                    .name(format!("treeshard-worker-{}", worker_id))
                    .spawn_scoped(scope, move || {
                        tracing::dispatcher::with_default(ctx.dispatch, || {
                            ctx.work(worker_id, &task_rx, &result_tx, worker)
                        })
                    })
                    .map_err(|e| ShardError::ThreadPoolError(e.to_string()))?;
            }
            Ok(())
        })?;

        drop(result_tx);
        let results: Vec<R> = result_rx.try_iter().collect();

        let completed = self.stats.completed();
        let failed = self.stats.failed();
        let skipped = (total as u64).saturating_sub(completed + failed);

        if skipped > 0 {
            tracing::warn!(skipped, "batch cancelled before all tasks started");
        }

        Ok(BatchOutcome {
            results,
            submitted: total as u64,
            completed,
            failed,
            skipped,
            duration: start.elapsed(),
        })
    }
}

/// State borrowed by every worker thread of one batch
struct WorkerContext<'a> {
    stats: &'a PoolStats,
    progress: Option<&'a ProgressReporter>,
    cancel: &'a CancellationToken,
    dispatch: &'a Dispatch,
}

impl WorkerContext<'_> {
    fn work<T, R, F>(&self, worker_id: usize, task_rx: &Receiver<T>, result_tx: &Sender<R>, worker: &F)
    where
        T: fmt::Debug,
        F: Fn(&T) -> Result<Option<R>>,
    {
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(worker = worker_id, "cancelled, stopping");
                break;
            }

            let task = match task_rx.recv() {
                Ok(task) => task,
                Err(_) => break,
            };

            match panic::catch_unwind(AssertUnwindSafe(|| worker(&task))) {
                Ok(Ok(Some(value))) => {
                    self.stats.completed.fetch_add(1, Ordering::Relaxed);
                    let _ = result_tx.send(value);
                }
                Ok(Ok(None)) => {
                    self.stats.completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(err)) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    match err.path() {
                        Some(path) => tracing::error!(
                            worker = worker_id,
                            task = ?task,
                            path = %path.display(),
                            error = %err,
                            "task failed"
                        ),
                        None => tracing::error!(worker = worker_id, task = ?task, error = %err, "task failed"),
                    }
                }
                Err(payload) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    let err = ShardError::WorkerPanic(panic_message(payload.as_ref()));
                    tracing::error!(worker = worker_id, task = ?task, error = %err, "task failed");
                }
            }

            if let Some(progress) = self.progress {
                progress.increment_tasks(1);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::LogCapture;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Barrier;

    #[test]
    fn test_zero_workers_rejected() {
        let err = WorkerPool::new(0).err().unwrap();
        assert_eq!(err.class(), crate::error::ErrorClass::Configuration);
    }

    #[test]
    fn test_empty_batch() {
        let outcome = WorkerPool::new(4)
            .unwrap()
            .run(Vec::<u32>::new(), |_| Ok(Some(1u32)))
            .unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.submitted, 0);
        assert_eq!(outcome.skipped, 0);
    }

    #[test]
    fn test_collects_only_non_empty_results() {
        let tasks: Vec<u32> = (0..100).collect();
        let outcome = WorkerPool::new(8)
            .unwrap()
            .run(tasks, |n| Ok(if n % 2 == 0 { Some(*n) } else { None }))
            .unwrap();

        let got: HashSet<u32> = outcome.results.iter().copied().collect();
        let want: HashSet<u32> = (0..100).filter(|n| n % 2 == 0).collect();
        assert_eq!(got, want);
        assert_eq!(outcome.results.len(), 50);
        assert_eq!(outcome.completed, 100);
        assert_eq!(outcome.failed, 0);
    }

    #[test]
    fn test_failures_are_isolated() {
        let tasks: Vec<u32> = (0..20).collect();
        let outcome = WorkerPool::new(4)
            .unwrap()
            .run(tasks, |n| {
                if n % 5 == 0 {
                    Err(ShardError::NotFound(PathBuf::from(format!("/missing/{}", n))))
                } else {
                    Ok(Some(*n))
                }
            })
            .unwrap();

        assert_eq!(outcome.failed, 4);
        assert_eq!(outcome.completed, 16);
        assert_eq!(outcome.results.len(), 16);
        assert!(outcome.results.iter().all(|n| n % 5 != 0));
    }

    #[test]
    fn test_panics_are_isolated() {
        let tasks: Vec<u32> = (0..10).collect();
        let outcome = WorkerPool::new(3)
            .unwrap()
            .run(tasks, |n| {
                if *n == 7 {
                    panic!("bad task");
                }
                Ok(Some(*n))
            })
            .unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.results.len(), 9);
    }

    #[test]
    fn test_failure_logged_with_task_and_path() {
        let capture = LogCapture::new();
        let outcome = WorkerPool::new(2)
            .unwrap()
            .with_dispatch(capture.dispatch())
            .run(vec!["ok", "bad"], |name| {
                if *name == "bad" {
                    Err(ShardError::NotFound(PathBuf::from("/data/bad.png")))
                } else {
                    Ok(Some(()))
                }
            })
            .unwrap();

        assert_eq!(outcome.failed, 1);
        let logs = capture.contents();
        assert_eq!(capture.count("task failed"), 1);
        assert!(logs.contains("ERROR"));
        assert!(logs.contains("/data/bad.png"));
        assert!(logs.contains("\"bad\""));
    }

    #[test]
    fn test_pathless_failure_has_no_path_field() {
        let capture = LogCapture::new();
        WorkerPool::new(1)
            .unwrap()
            .with_dispatch(capture.dispatch())
            .run(vec![1u32], |_| Err::<Option<()>, _>(ShardError::config("bad option")))
            .unwrap();

        let logs = capture.contents();
        assert_eq!(capture.count("task failed"), 1);
        assert!(logs.contains("bad option"));
        assert!(!logs.contains("path="));
    }

    #[test]
    fn test_invalid_path_failure_logs_path_field() {
        let capture = LogCapture::new();
        WorkerPool::new(1)
            .unwrap()
            .with_dispatch(capture.dispatch())
            .run(vec![1u32], |_| {
                Err::<Option<()>, _>(ShardError::invalid_path("/data/y.txt", "not located under '/src'"))
            })
            .unwrap();

        assert!(capture.contents().contains("path=/data/y.txt"));
    }

    #[test]
    fn test_workers_run_in_parallel() {
        // Every task waits for all four; a serial pool would deadlock here.
        let barrier = Barrier::new(4);
        let outcome = WorkerPool::new(4)
            .unwrap()
            .run(vec![1, 2, 3, 4], |n| {
                barrier.wait();
                Ok(Some(*n))
            })
            .unwrap();
        assert_eq!(outcome.results.len(), 4);
    }

    #[test]
    fn test_cancel_before_run_skips_everything() {
        let pool = WorkerPool::new(4).unwrap();
        pool.cancellation_token().cancel();

        let outcome = pool.run((0..10).collect::<Vec<u32>>(), |n| Ok(Some(*n))).unwrap();
        assert_eq!(outcome.completed, 0);
        assert_eq!(outcome.skipped, 10);
    }

    #[test]
    fn test_cancel_lets_in_flight_task_finish() {
        let token = CancellationToken::new();
        let pool = WorkerPool::new(1).unwrap().with_cancellation(token.clone());

        let outcome = pool
            .run((0..10).collect::<Vec<u32>>(), |n| {
                token.cancel();
                Ok(Some(*n))
            })
            .unwrap();

        assert_eq!(outcome.results, vec![0]);
        assert_eq!(outcome.completed, 1);
        assert_eq!(outcome.skipped, 9);
    }

    #[test]
    fn test_stats_and_progress_track_batch() {
        let progress = Arc::new(ProgressReporter::disabled());
        let pool = WorkerPool::new(4).unwrap().with_progress(Arc::clone(&progress));
        let stats = pool.stats();

        pool.run((0..25).collect::<Vec<u32>>(), |n| {
            if *n == 3 {
                Err(ShardError::config("rejected"))
            } else {
                Ok(None::<u32>)
            }
        })
        .unwrap();

        assert_eq!(stats.submitted(), 25);
        assert_eq!(stats.completed(), 24);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.finished(), 25);
        assert_eq!(progress.summary().tasks_done, 25);
    }
}
