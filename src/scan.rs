//! Input enumeration.
//!
//! The source folder is scanned non-recursively. A file is an input when its
//! extension matches the configured allow-list, compared case-insensitively.
//! Everything else (subdirectories, hidden files, sidecars) is skipped
//! silently, so the loader only ever sees files it is expected to decode.
//!
//! Inputs are returned sorted by path; that order is the batch's enumeration
//! order.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Source folder not found: {0}")]
    NotFound(PathBuf),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Cannot read {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// List the supported image files directly inside `dir`.
pub fn enumerate_inputs(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, ScanError> {
    if !dir.exists() {
        return Err(ScanError::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.to_path_buf()));
    }

    let mut inputs = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ScanError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && is_input(entry.path(), extensions) {
            inputs.push(entry.into_path());
        }
    }
    Ok(inputs)
}

fn is_input(path: &Path, extensions: &[String]) -> bool {
    let hidden = path
        .file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'));
    if hidden {
        return false;
    }
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext)))
}
