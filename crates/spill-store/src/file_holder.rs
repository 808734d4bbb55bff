// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shared-ownership handles to spill-file paths.
//!
//! A [`FileHolder`] is the RAII primitive for temporary files: the path
//! plus an optional shared delete guard. Cloning a holder shares the
//! guard rather than duplicating it, so however many records or readers
//! reference the same spill file, it is deleted exactly once — when the
//! last clone is dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Deletes its file when dropped. Shared between all clones of a holder.
#[derive(Debug)]
struct DeleteGuard {
    path: PathBuf,
}

impl Drop for DeleteGuard {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("failed to delete spill file '{}': {e}", self.path.display());
            }
        }
    }
}

/// A cloneable handle to a spill-file path with optional auto-delete.
///
/// The holder may be empty (no path), path-only (no deletion on drop),
/// or auto-deleting (the common case for manager-created spill files).
///
/// # Example
/// ```
/// use spill_store::FileHolder;
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("spill.bin");
/// std::fs::write(&path, b"x").unwrap();
///
/// let a = FileHolder::auto_delete(path.clone());
/// let b = a.clone(); // shares the delete guard
/// drop(a);
/// assert!(path.exists()); // b still holds the guard
/// drop(b);
/// assert!(!path.exists());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileHolder {
    path: Option<PathBuf>,
    guard: Option<Arc<DeleteGuard>>,
}

impl FileHolder {
    /// Creates an empty holder (no path, no guard).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a holder for `path` without deletion semantics.
    ///
    /// Used when the caller owns the file's lifetime — e.g. a
    /// user-supplied backing file that must outlive the registry.
    pub fn plain(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            guard: None,
        }
    }

    /// Creates a holder that deletes `path` when the last clone drops.
    pub fn auto_delete(path: PathBuf) -> Self {
        Self {
            path: Some(path.clone()),
            guard: Some(Arc::new(DeleteGuard { path })),
        }
    }

    /// Returns the held path, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns `true` if the holder has no path.
    pub fn is_empty(&self) -> bool {
        self.path.is_none()
    }

    /// Returns `true` if this holder participates in auto-deletion.
    pub fn deletes_on_drop(&self) -> bool {
        self.guard.is_some()
    }

    /// Number of holders sharing the delete guard (0 for plain holders).
    pub fn holder_count(&self) -> usize {
        self.guard.as_ref().map_or(0, Arc::strong_count)
    }

    /// Drops the path and the guard reference.
    ///
    /// If this was the last clone of an auto-deleting holder, the file
    /// is deleted here.
    pub fn clear(&mut self) {
        self.path = None;
        self.guard = None;
    }

    /// Detaches the delete guard, leaving the file on disk permanently.
    ///
    /// Affects only this clone's participation: other clones still
    /// delete the file when the last of them drops. Mainly useful in
    /// diagnostics and tests.
    pub fn persist(&mut self) {
        self.guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"data").unwrap();
        path
    }

    #[test]
    fn test_empty_holder() {
        let h = FileHolder::empty();
        assert!(h.is_empty());
        assert!(h.path().is_none());
        assert!(!h.deletes_on_drop());
        assert_eq!(h.holder_count(), 0);
    }

    #[test]
    fn test_plain_does_not_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "keep.bin");

        let h = FileHolder::plain(path.clone());
        assert!(!h.deletes_on_drop());
        drop(h);
        assert!(path.exists());
    }

    #[test]
    fn test_auto_delete_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "gone.bin");

        let h = FileHolder::auto_delete(path.clone());
        assert!(h.deletes_on_drop());
        drop(h);
        assert!(!path.exists());
    }

    #[test]
    fn test_clone_shares_guard() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "shared.bin");

        let a = FileHolder::auto_delete(path.clone());
        let b = a.clone();
        let c = b.clone();
        assert_eq!(a.holder_count(), 3);

        drop(a);
        drop(c);
        assert!(path.exists(), "file must survive until the last holder");
        drop(b);
        assert!(!path.exists());
    }

    #[test]
    fn test_clear_releases_guard() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "cleared.bin");

        let mut a = FileHolder::auto_delete(path.clone());
        let b = a.clone();
        a.clear();
        assert!(a.is_empty());
        assert!(path.exists());
        drop(b);
        assert!(!path.exists());
    }

    #[test]
    fn test_persist_detaches_this_clone_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "persisted.bin");

        let mut a = FileHolder::auto_delete(path.clone());
        let b = a.clone();
        a.persist();
        assert!(!a.deletes_on_drop());
        drop(b); // last *guarded* clone
        assert!(!path.exists());
        drop(a);
    }

    #[test]
    fn test_missing_file_drop_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "early.bin");
        let h = FileHolder::auto_delete(path.clone());
        std::fs::remove_file(&path).unwrap();
        drop(h); // must not panic
    }
}
