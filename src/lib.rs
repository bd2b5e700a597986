//! # treeshard - Parallel Listing and Copying of Large File Trees
//!
//! treeshard splits a directory tree into shards at a fixed depth, lists the
//! shards on a pool of worker threads, and copies file lists between trees
//! without ever overwriting what is already at the destination. A failure
//! in one task is logged and counted; the rest of the batch carries on.
//!
//! ## Features
//!
//! - **Depth-sharded listing**: One worker task per directory at the shard depth
//! - **Filtering**: Exclude by name substring, keep by extension
//! - **Idempotent copies**: Existing destinations are never touched
//! - **Atomic placement**: Files are staged and moved into place, never half-written
//! - **Path rewriting**: Swap roots and extensions between parallel layouts
//!
//! ## Quick Start
//!
//! ```no_run
//! use treeshard::fs::{ScanConfig, Scanner};
//! use std::path::Path;
//!
//! let config = ScanConfig {
//!     max_depth: 2,
//!     extensions: vec![".png".to_string()],
//!     ..Default::default()
//! };
//!
//! let result = Scanner::new(config).unwrap().scan(Path::new("/data")).unwrap();
//! println!("Found {} files in {} shards", result.files.len(), result.shards);
//! ```
//!
//! ## Copying
//!
//! ```no_run
//! use treeshard::config::CopyConfig;
//! use treeshard::core::{CopyOrchestrator, FileList};
//! use std::path::{Path, PathBuf};
//!
//! let orchestrator = CopyOrchestrator::new(CopyConfig::default());
//! let report = orchestrator
//!     .copy_by_list(
//!         FileList::ListFile(PathBuf::from("files.txt")),
//!         Path::new("/data"),
//!         Path::new("/backup"),
//!     )
//!     .unwrap();
//!
//! report.print_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod progress;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::CopyConfig;
pub use core::{CopyOrchestrator, CopyReport, WorkerPool};
pub use error::{Result, ShardError};
pub use fs::{PathRewriter, ScanConfig, ScanResult, Scanner};
pub use progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use treeshard::prelude::*;
    //! ```

    pub use crate::config::CopyConfig;
    pub use crate::core::{CancellationToken, CopyOrchestrator, CopyReport, FileList, WorkerPool};
    pub use crate::error::{ErrorClass, Result, ShardError};
    pub use crate::fs::{
        find_subdirectories_containing, read_json, read_lines, restructure_by_id, FileFilter,
        PathRewriter, ScanConfig, ScanResult, Scanner,
    };
    pub use crate::progress::ProgressReporter;
}
