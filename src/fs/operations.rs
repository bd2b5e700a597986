//! File operations
//!
//! Provides the no-clobber file copy used by copy tasks and the readers for
//! path lists and JSON inputs.

use crate::error::{IoResultExt, Result, ShardError};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

/// Copy operation statistics
#[derive(Debug, Clone, Default)]
pub struct CopyStats {
    /// Bytes copied
    pub bytes_copied: u64,
    /// Duration of the copy
    pub duration: Duration,
}

/// What happened when placing a file at its destination
#[derive(Debug, Clone)]
pub enum PlaceOutcome {
    /// The file was written
    Written(CopyStats),
    /// Something already occupied the destination; nothing was written
    DestinationExists,
}

/// Largest buffer a copier will allocate
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024 * 1024;

/// Smallest buffer used for a single copy
const MIN_BUFFER_SIZE: usize = 8 * 1024;

/// Options for file copy operations
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Buffer size for buffered operations
    pub buffer_size: usize,
    /// Preserve file permissions
    pub preserve_permissions: bool,
    /// Sync to disk before the file is moved into place
    pub sync: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1024 * 1024, // 1MB
            preserve_permissions: false,
            sync: false,
        }
    }
}

/// File copier that never leaves a partial file at the destination
#[derive(Debug, Clone)]
pub struct FileCopier {
    options: CopyOptions,
}

impl Default for FileCopier {
    fn default() -> Self {
        Self::new(CopyOptions::default())
    }
}

impl FileCopier {
    /// Create a new file copier. The buffer size is clamped to
    /// `1..=MAX_BUFFER_SIZE`.
    pub fn new(mut options: CopyOptions) -> Self {
        options.buffer_size = options.buffer_size.clamp(1, MAX_BUFFER_SIZE);
        Self { options }
    }

    /// Copy `source` to `dest` unless `dest` exists.
    ///
    /// Bytes go to a temporary file next to `dest`, which is then linked
    /// into place without replacing anything. A failed copy leaves no file
    /// at `dest`.
    pub fn copy_no_clobber(&self, source: &Path, dest: &Path) -> Result<PlaceOutcome> {
        let start = Instant::now();

        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).with_path(parent)?;

        let src_file = File::open(source).with_path(source)?;
        let src_len = src_file.metadata().with_path(source)?.len();
        let capacity = self
            .options
            .buffer_size
            .min(usize::try_from(src_len).unwrap_or(usize::MAX).max(MIN_BUFFER_SIZE));
        let mut staged = tempfile::Builder::new()
            .prefix(".treeshard-")
            .suffix(".part")
            .tempfile_in(parent)
            .with_path(parent)?;

        let bytes_copied = {
            let mut reader = BufReader::with_capacity(capacity, src_file);
            let mut writer = BufWriter::with_capacity(capacity, staged.as_file_mut());
            let bytes = std::io::copy(&mut reader, &mut writer).with_path(source)?;
            writer.flush().with_path(dest)?;
            bytes
        };

        if self.options.preserve_permissions {
            let permissions = std::fs::metadata(source).with_path(source)?.permissions();
            staged.as_file().set_permissions(permissions).with_path(dest)?;
        }

        if self.options.sync {
            staged.as_file().sync_all().with_path(dest)?;
        }

        match staged.persist_noclobber(dest) {
            Ok(_) => Ok(PlaceOutcome::Written(CopyStats {
                bytes_copied,
                duration: start.elapsed(),
            })),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                Ok(PlaceOutcome::DestinationExists)
            }
            Err(e) => Err(ShardError::io(dest, e.error)),
        }
    }
}

/// Read a line-delimited list, trimming whitespace and dropping blank lines
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Err(ShardError::NotFound(path.to_path_buf()));
    }

    let raw = std::fs::read_to_string(path).with_path(path)?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Read a `.json` file into `T`
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return Err(ShardError::config(format!(
            "'{}' must end with .json",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(ShardError::NotFound(path.to_path_buf()));
    }

    let file = File::open(path).with_path(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| ShardError::Parse(format!("{}: {}", path.display(), e)))
}
