//! Core execution module
//!
//! Provides the worker pool that runs independent tasks in parallel and
//! the copy orchestration built on top of it.

mod copier;
mod pool;

pub use copier::*;
pub use pool::*;
