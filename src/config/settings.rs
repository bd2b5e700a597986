//! Configuration settings for treeshard
//!
//! Defines CLI arguments, subcommands, and the runtime configuration the
//! copy orchestrator is built from.

use crate::error::{Result, ShardError};
use crate::fs::MAX_BUFFER_SIZE;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// treeshard - parallel listing, copying, and rewriting of large file trees
#[derive(Parser, Debug, Clone)]
#[command(name = "treeshard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Parallel listing and copying of very large directory trees")]
#[command(long_about = r#"
treeshard splits a directory tree into shards at a fixed depth and lists
them in parallel, then copies file lists between trees without ever
overwriting what is already at the destination.

Examples:
  treeshard list /data --depth 2 --ext .png --output files.txt
  treeshard copy --src /data --dst /backup --list files.txt
  treeshard copy-pairs --pairs pairs.json
  treeshard rewrite /data/a/x.png --src-root /data --dst-root /out
"#)]
pub struct CliArgs {
    /// Number of parallel worker threads (0 = auto-detect)
    #[arg(short = 't', long, global = true, default_value = "0", value_name = "NUM")]
    pub threads: usize,

    /// Buffer size for file copies (e.g., 1M, 64K)
    #[arg(short = 'b', long, global = true, default_value = "1M", value_name = "SIZE")]
    pub buffer_size: String,

    /// Copy file permissions along with contents
    #[arg(long, global = true)]
    pub preserve_permissions: bool,

    /// Sync copied files to disk before moving them into place
    #[arg(long, global = true)]
    pub sync: bool,

    /// Show a progress bar
    #[arg(short = 'p', long, global = true)]
    pub progress: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Output format for reports
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Log file path (defaults to stderr)
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List all files under a root, one shard per directory at --depth
    #[command(name = "list")]
    List {
        /// Root directory
        root: PathBuf,
        /// Depth at which the tree is split into shards
        #[arg(short, long, default_value = "1")]
        depth: usize,
        /// Skip files whose name contains this text (repeatable)
        #[arg(long, value_name = "TEXT")]
        exclude: Vec<String>,
        /// Keep only files with this extension, e.g. .png (repeatable)
        #[arg(long = "ext", value_name = "EXT")]
        extensions: Vec<String>,
        /// Write the list to a file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Copy files from one root to another, keeping relative paths
    #[command(name = "copy")]
    Copy {
        /// Source root
        #[arg(long)]
        src: PathBuf,
        /// Destination root
        #[arg(long)]
        dst: PathBuf,
        /// Line-delimited list of files to copy
        #[arg(long, value_name = "PATH", conflicts_with = "files", required_unless_present = "files")]
        list: Option<PathBuf>,
        /// Files to copy, relative to --src or absolute
        files: Vec<PathBuf>,
    },

    /// Copy explicit (source, destination) pairs read from a JSON file
    #[command(name = "copy-pairs")]
    CopyPairs {
        /// JSON array of [source, destination] pairs
        #[arg(long, value_name = "PATH")]
        pairs: PathBuf,
    },

    /// Rewrite paths to a new root and/or extension
    #[command(name = "rewrite")]
    Rewrite {
        /// Paths to rewrite
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Root the paths currently live under
        #[arg(long, requires = "dst_root")]
        src_root: Option<PathBuf>,
        /// Root to move the paths under
        #[arg(long, requires = "src_root")]
        dst_root: Option<PathBuf>,
        /// Extension to replace, e.g. .jpg (repeatable)
        #[arg(long, value_name = "EXT", requires = "dst_ext")]
        src_ext: Vec<String>,
        /// Replacement extension
        #[arg(long, value_name = "EXT")]
        dst_ext: Option<String>,
    },

    /// Find directories whose name contains a piece of text
    #[command(name = "subdirs")]
    Subdirs {
        /// Root directory
        root: PathBuf,
        /// Text the directory name must contain
        #[arg(long)]
        contains: String,
    },

    /// Regroup a path list under a new root, starting at an id segment
    #[command(name = "restructure")]
    Restructure {
        /// Line-delimited list of paths
        #[arg(long, value_name = "PATH")]
        paths: PathBuf,
        /// Destination root
        #[arg(long)]
        dst_root: PathBuf,
        /// Index of the '/'-separated segment holding the id
        #[arg(long)]
        id_index: usize,
        /// Copy the files instead of only printing the pairs
        #[arg(long)]
        copy: bool,
    },
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Log line format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Runtime configuration for copy batches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Number of worker threads (0 = auto)
    pub threads: usize,
    /// Buffer size for copies
    pub buffer_size: usize,
    /// Copy permissions with the contents
    pub preserve_permissions: bool,
    /// fsync before the file is moved into place
    pub sync: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            buffer_size: 1024 * 1024, // 1MB
            preserve_permissions: false,
            sync: false,
        }
    }
}

impl CopyConfig {
    /// Create config from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let buffer_size = parse_size(&args.buffer_size)
            .map_err(|e| ShardError::config(format!("Invalid buffer size: {}", e)))?;
        if buffer_size == 0 {
            return Err(ShardError::config("Buffer size must be greater than zero"));
        }
        if buffer_size > MAX_BUFFER_SIZE as u64 {
            return Err(ShardError::config(format!(
                "Buffer size {} exceeds the {} limit",
                args.buffer_size,
                humansize::format_size(MAX_BUFFER_SIZE as u64, humansize::BINARY)
            )));
        }

        Ok(Self {
            threads: args.threads,
            buffer_size: buffer_size as usize,
            preserve_permissions: args.preserve_permissions,
            sync: args.sync,
        })
    }
}

/// Worker count to use for a configured value (0 = one per CPU)
pub fn resolve_threads(configured: usize) -> usize {
    if configured == 0 {
        num_cpus::get().max(1)
    } else {
        configured
    }
}

/// Parse size string (e.g., "1M", "64K", "1.5G") to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;
    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}
