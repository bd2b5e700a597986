//! Path rewriting between source and destination layouts
//!
//! Pure functions that remap a path from one root and extension to
//! another. Used by the copy orchestrator to derive destination paths and
//! by callers preparing paired copy lists.

use crate::error::{Result, ShardError};
use rayon::prelude::*;
use std::path::{Component, Path, PathBuf};

/// Check that an extension is written with its leading dot, e.g. `.png`
pub fn validate_extension(extension: &str) -> Result<()> {
    if extension.len() < 2 || !extension.starts_with('.') {
        return Err(ShardError::config(format!(
            "extension '{}' must start with '.', such as '.jpg'",
            extension
        )));
    }
    Ok(())
}

/// Current extension of `path` including the dot, if any
fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
}

/// Replace the extension of `path` with `dest_extension` when its current
/// extension is one of `allowed_source_extensions`. Other paths are returned
/// unchanged.
pub fn rewrite_extension(
    path: &Path,
    allowed_source_extensions: &[String],
    dest_extension: &str,
) -> Result<PathBuf> {
    validate_extension(dest_extension)?;
    for ext in allowed_source_extensions {
        validate_extension(ext)?;
    }

    match dotted_extension(path) {
        Some(current) if allowed_source_extensions.iter().any(|e| *e == current) => {
            Ok(path.with_extension(&dest_extension[1..]))
        }
        _ => Ok(path.to_path_buf()),
    }
}

/// Render a path with `/` separators regardless of platform
pub fn to_posix(path: &Path) -> String {
    let rendered = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        rendered.into_owned()
    } else {
        rendered.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

#[cfg(windows)]
fn normalize_separators(path: PathBuf) -> PathBuf {
    PathBuf::from(to_posix(&path))
}

#[cfg(not(windows))]
fn normalize_separators(path: PathBuf) -> PathBuf {
    path
}

/// Move `path` from under `src_root` to the same relative place under
/// `dst_root`. Fails if `path` is not located under `src_root`, or if the
/// part below `src_root` contains `..` and could climb out of `dst_root`.
pub fn rewrite_root(path: &Path, src_root: &Path, dst_root: &Path) -> Result<PathBuf> {
    let relative = path.strip_prefix(src_root).map_err(|_| {
        ShardError::invalid_path(path, format!("not located under '{}'", src_root.display()))
    })?;

    if relative.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ShardError::invalid_path(path, "'..' is not allowed below the source root"));
    }

    Ok(normalize_separators(dst_root.join(relative)))
}

/// Combined root and extension rewrite.
///
/// Roots and extensions are configured in pairs: both or neither. The
/// extension is rewritten first, then the root.
#[derive(Debug, Clone, Default)]
pub struct PathRewriter {
    roots: Option<(PathBuf, PathBuf)>,
    extensions: Option<(Vec<String>, String)>,
}

impl PathRewriter {
    /// Build a rewriter, rejecting half-configured root or extension pairs
    pub fn new(
        src_root: Option<PathBuf>,
        dst_root: Option<PathBuf>,
        src_extensions: Option<Vec<String>>,
        dst_extension: Option<String>,
    ) -> Result<Self> {
        let roots = match (src_root, dst_root) {
            (Some(src), Some(dst)) => Some((src, dst)),
            (None, None) => None,
            _ => {
                return Err(ShardError::config(
                    "source and destination roots must both be set or both be unset",
                ))
            }
        };

        let extensions = match (src_extensions, dst_extension) {
            (Some(src), Some(dst)) => {
                if src.is_empty() {
                    return Err(ShardError::config("source extension list is empty"));
                }
                for ext in &src {
                    validate_extension(ext)?;
                }
                validate_extension(&dst)?;
                Some((src, dst))
            }
            (None, None) => None,
            _ => {
                return Err(ShardError::config(
                    "source and destination extensions must both be set or both be unset",
                ))
            }
        };

        Ok(Self { roots, extensions })
    }

    /// Rewriter that only swaps roots
    pub fn roots(src_root: impl Into<PathBuf>, dst_root: impl Into<PathBuf>) -> Self {
        Self {
            roots: Some((src_root.into(), dst_root.into())),
            extensions: None,
        }
    }

    /// Rewrite a single path
    pub fn rewrite(&self, path: &Path) -> Result<PathBuf> {
        let path = match &self.extensions {
            Some((src, dst)) => rewrite_extension(path, src, dst)?,
            None => path.to_path_buf(),
        };

        match &self.roots {
            Some((src_root, dst_root)) => rewrite_root(&path, src_root, dst_root),
            None => Ok(normalize_separators(path)),
        }
    }

    /// Rewrite many paths, keeping input order. Fails on the first path
    /// outside the source root.
    pub fn rewrite_all(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        paths.par_iter().map(|p| self.rewrite(p)).collect()
    }
}

/// Regroup paths under `dst_root` by one of their segments.
///
/// Each path is split on `/` (an absolute path starts with an empty
/// segment) and everything from segment `id_index` onwards is placed under
/// `dst_root`, so `/p1/<id>/x/1.jpg` and `/p2/<id>/x/2.jpg` both land in
/// `dst_root/<id>/x/`. Returns parallel source and destination lists sorted
/// by id, ready for a paired copy.
pub fn restructure_by_id(
    paths: &[PathBuf],
    dst_root: &Path,
    id_index: usize,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut keyed = Vec::with_capacity(paths.len());

    for path in paths {
        let posix = to_posix(path);
        let segments: Vec<&str> = posix.split('/').collect();
        match segments.get(id_index) {
            Some(id) if !id.is_empty() => {
                let tail = segments[id_index..].join("/");
                keyed.push((id.to_string(), path.clone(), dst_root.join(tail)));
            }
            _ => {
                return Err(ShardError::invalid_path(
                    path,
                    format!("no id segment at index {}", id_index),
                ))
            }
        }
    }

    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, src, dst)| (src, dst)).unzip())
}
