//! Progress reporting module
//!
//! Provides a task-count progress bar for worker pool batches.

mod reporter;

pub use reporter::*;
