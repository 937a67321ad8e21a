//! Directory snapshots and new-file detection by set difference.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// All file paths observed in the watched tree at one poll tick.
///
/// Keeps traversal order for dispatch; membership tests go through a set.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    ordered: Vec<PathBuf>,
    index: HashSet<PathBuf>,
}

impl DirectorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from paths in traversal order. Duplicates keep their first position.
    pub fn from_paths<I>(paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut snapshot = Self::default();
        for path in paths {
            if snapshot.index.insert(path.clone()) {
                snapshot.ordered.push(path);
            }
        }
        snapshot
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains(path)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.ordered.iter().map(PathBuf::as_path)
    }

    /// Paths present here but absent from `previous`, in this snapshot's traversal order.
    pub fn new_since(&self, previous: &DirectorySnapshot) -> Vec<PathBuf> {
        self.ordered
            .iter()
            .filter(|p| !previous.contains(p))
            .cloned()
            .collect()
    }
}

impl PartialEq for DirectorySnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for DirectorySnapshot {}

/// Remembers the last snapshot and every path already offered for dispatch.
///
/// A path is offered at most once per session: files that are deleted and
/// reappear under the same name are not offered again.
#[derive(Debug, Clone, Default)]
pub struct SnapshotTracker {
    current: DirectorySnapshot,
    offered: HashSet<PathBuf>,
}

impl SnapshotTracker {
    /// Start tracking from an initial snapshot. Files already present are never offered.
    pub fn new(initial: DirectorySnapshot) -> Self {
        let offered = initial.index.clone();
        Self {
            current: initial,
            offered,
        }
    }

    /// Replace the remembered snapshot and return the paths that are new.
    ///
    /// The replacement happens before the caller dispatches anything, so a
    /// path returned here is never returned again.
    pub fn advance(&mut self, next: DirectorySnapshot) -> Vec<PathBuf> {
        let fresh: Vec<PathBuf> = next
            .new_since(&self.current)
            .into_iter()
            .filter(|p| self.offered.insert(p.clone()))
            .collect();
        self.current = next;
        fresh
    }

    pub fn current(&self) -> &DirectorySnapshot {
        &self.current
    }
}
