//! File system module
//!
//! Depth-sharded scanning, path rewriting between layouts, and the
//! no-clobber copy and list readers used by copy batches.

mod operations;
mod rewrite;
mod scanner;

pub use operations::*;
pub use rewrite::*;
pub use scanner::*;
