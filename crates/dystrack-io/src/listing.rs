//! Recursive listing of the watched directory tree.

use std::path::{Path, PathBuf};

use dystrack_core::DirectorySnapshot;
use walkdir::WalkDir;

use crate::error::ListingError;

/// Reject a target directory that does not exist before the loop starts.
pub fn ensure_target_dir(dir: &Path) -> Result<PathBuf, ListingError> {
    if !dir.is_dir() {
        return Err(ListingError::NotADirectory(dir.to_path_buf()));
    }
    Ok(std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf()))
}

/// List every file under `root` (subdirectories included) in traversal order.
///
/// Any walk error is returned as-is; the caller treats it as fatal.
pub fn snapshot_dir(root: &Path) -> Result<DirectorySnapshot, ListingError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|source| ListingError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    Ok(DirectorySnapshot::from_paths(paths))
}
