//! Progress reporter implementation
//!
//! Uses indicatif for a task-count bar plus a status spinner. All counters
//! are atomics and `ProgressBar::inc` is lock-free on the hot path, so
//! workers can report completion without waiting on each other.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Progress reporter for batch operations
pub struct ProgressReporter {
    /// Multi-progress container
    multi: MultiProgress,
    /// Finished-task bar
    tasks_bar: ProgressBar,
    /// Current status message
    status: ProgressBar,
    /// Start time
    start_time: Instant,
    /// Total tasks in the batch
    total_tasks: AtomicU64,
    /// Tasks finished so far (success or failure)
    tasks_done: AtomicU64,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let status = multi.add(ProgressBar::new_spinner());
        status.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("Invalid template"),
        );

        let tasks_bar = multi.add(ProgressBar::new(0));
        tasks_bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%, ETA {eta})")
                .expect("Invalid template")
                .progress_chars("=> "),
        );
        tasks_bar.set_prefix("Tasks");

        Self {
            multi,
            tasks_bar,
            status,
            start_time: Instant::now(),
            total_tasks: AtomicU64::new(0),
            tasks_done: AtomicU64::new(0),
        }
    }

    /// Create a disabled progress reporter (for quiet mode)
    pub fn disabled() -> Self {
        let reporter = Self::new();
        reporter.multi.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Set the number of tasks in the batch
    pub fn set_total_tasks(&self, total: u64) {
        self.total_tasks.store(total, Ordering::Relaxed);
        self.tasks_bar.set_length(total);
    }

    /// Record finished tasks
    pub fn increment_tasks(&self, count: u64) {
        self.tasks_done.fetch_add(count, Ordering::Relaxed);
        self.tasks_bar.inc(count);
    }

    /// Set current status message
    pub fn set_status(&self, msg: &str) {
        self.status.set_message(msg.to_string());
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Finish progress with success message
    pub fn finish_success(&self, message: &str) {
        self.status.finish_with_message(format!("✓ {}", message));
        self.tasks_bar.finish();
    }

    /// Finish progress with error message
    pub fn finish_error(&self, message: &str) {
        self.status.finish_with_message(format!("✗ {}", message));
        self.tasks_bar.abandon();
    }

    /// Get progress summary
    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            total_tasks: self.total_tasks.load(Ordering::Relaxed),
            tasks_done: self.tasks_done.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress summary
#[derive(Debug, Clone)]
pub struct ProgressSummary {
    /// Total tasks in the batch
    pub total_tasks: u64,
    /// Tasks finished so far
    pub tasks_done: u64,
    /// Elapsed time
    pub elapsed: Duration,
}

impl ProgressSummary {
    /// Get completion percentage
    pub fn percentage(&self) -> f64 {
        if self.total_tasks == 0 {
            0.0
        } else {
            (self.tasks_done as f64 / self.total_tasks as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_reporter() {
        let reporter = ProgressReporter::disabled();

        reporter.set_total_tasks(10);
        reporter.increment_tasks(5);

        let summary = reporter.summary();
        assert_eq!(summary.tasks_done, 5);
        assert_eq!(summary.percentage(), 50.0);
    }

    #[test]
    fn test_empty_summary() {
        let reporter = ProgressReporter::disabled();
        assert_eq!(reporter.summary().percentage(), 0.0);
    }
}
