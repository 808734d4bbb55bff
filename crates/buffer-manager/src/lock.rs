// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scoped residency locks.
//!
//! A [`BufferLock`] is the caller's claim that a buffer must stay
//! resident. The lock count the registry consults is not a stored
//! integer — it is the strong count of a shared [`LockMarker`] the
//! record holds weakly. Token lifetime therefore IS the lock lifetime:
//! no holder can forget to unlock, and re-locking a locked buffer just
//! clones the existing marker.
//!
//! When the last token drops, the marker's drop notifies the manager so
//! the active dump policy can react to the release.

use crate::manager::Task;
use crate::record::DataCell;
use crate::BufferId;
use crossbeam_channel::Sender;
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Shared lock marker; one per locked buffer, strong count = lock count.
pub(crate) struct LockMarker {
    id: BufferId,
    tasks: Sender<Task>,
}

impl LockMarker {
    pub(crate) fn new(id: BufferId, tasks: Sender<Task>) -> Self {
        Self { id, tasks }
    }
}

impl Drop for LockMarker {
    fn drop(&mut self) {
        // Last token released: let the policy observe the unlock. The
        // send fails only after shutdown, where nobody is listening.
        let id = self.id;
        let _ = self
            .tasks
            .send(Task::Run(Box::new(move |core| core.on_unlocked(id))));
    }
}

/// RAII token guaranteeing a buffer stays loaded.
///
/// While any clone of the token is alive, `dump` refuses the buffer.
/// The bytes are readable (and writable) directly through the token —
/// no round-trip through the manager's worker.
///
/// # Example
/// ```no_run
/// # use buffer_manager::{BufferManager, HeapAlloc};
/// let manager = BufferManager::new();
/// let id = manager.register();
/// manager.allocate(id, 1024, HeapAlloc::shared()).wait().unwrap();
///
/// let lock = manager.lock(id).wait().unwrap();
/// assert_eq!(lock.bytes().len(), 1024);
/// drop(lock); // buffer becomes evictable again
/// ```
pub struct BufferLock {
    id: BufferId,
    marker: Arc<LockMarker>,
    data: DataCell,
}

impl BufferLock {
    pub(crate) fn new(id: BufferId, marker: Arc<LockMarker>, data: DataCell) -> Self {
        Self { id, marker, data }
    }

    /// The locked buffer's id.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Read access to the buffer contents.
    ///
    /// An empty slice for a buffer in the empty state.
    pub fn bytes(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.data.read(), |slot| {
            slot.as_deref().unwrap_or(&[])
        })
    }

    /// Write access to the buffer contents.
    pub fn bytes_mut(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        RwLockWriteGuard::map(self.data.write(), |slot| {
            slot.as_deref_mut().unwrap_or(&mut [])
        })
    }

    /// Current byte length.
    pub fn len(&self) -> usize {
        self.data.read().as_ref().map_or(0, Vec::len)
    }

    /// True when the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for BufferLock {
    /// Cheap re-lock: clones the shared marker, bumping the lock count.
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            marker: Arc::clone(&self.marker),
            data: Arc::clone(&self.data),
        }
    }
}

impl std::fmt::Debug for BufferLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferLock")
            .field("id", &self.id)
            .field("holders", &Arc::strong_count(&self.marker))
            .field("len", &self.len())
            .finish()
    }
}
