//! Error types for treeshard
//!
//! Errors fall into three classes. Configuration and missing-path errors are
//! raised before any parallel work is scheduled and abort the call. Task
//! errors happen inside a worker; the pool logs them and keeps going, so they
//! never reach the caller of a batch.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for treeshard operations
#[derive(Error, Debug)]
pub enum ShardError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path the operation was working on
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File or directory not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Invalid path for the requested operation
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// Offending path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// Invalid combination of arguments
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed list or JSON input
    #[error("Parse error: {0}")]
    Parse(String),

    /// Worker threads could not be started
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// A worker panicked while running a task
    #[error("Worker panicked: {0}")]
    WorkerPanic(String),
}

/// Coarse classification used by callers and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Invalid arguments, raised before scheduling
    Configuration,
    /// A root directory or input list is missing, raised before scheduling
    PathNotFound,
    /// Failure of a single task, recovered inside the batch
    Task,
}

impl ShardError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create an invalid-path error
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ConfigError(_) | Self::InvalidPath { .. } => ErrorClass::Configuration,
            Self::NotFound(_) => ErrorClass::PathNotFound,
            _ => ErrorClass::Task,
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } | Self::NotFound(path) | Self::InvalidPath { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for treeshard operations
pub type Result<T> = std::result::Result<T, ShardError>;

impl From<std::io::Error> for ShardError {
    fn from(err: std::io::Error) -> Self {
        ShardError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for ShardError {
    fn from(err: serde_json::Error) -> Self {
        ShardError::Parse(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| ShardError::io(path, e))
    }
}
