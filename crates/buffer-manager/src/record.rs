// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-buffer bookkeeping.
//!
//! A [`BufferRecord`] is everything the registry knows about one buffer:
//! size, residency, lock state, backing file, stream factory, and the
//! allocation policy that owns its storage.
//!
//! The storage itself lives in a shared *data cell* —
//! `Arc<RwLock<Option<Vec<u8>>>>` — so lock tokens and in-memory readers
//! on caller threads can reach the bytes without a worker round-trip.
//! The worker only takes the cell's write lock when no lock token exists
//! (a locked buffer is never dumped), so the cell is effectively
//! uncontended; it is there for soundness, not throughput.

use crate::alloc::AllocPolicy;
use crate::lock::LockMarker;
use crate::stream::StreamFactory;
use parking_lot::RwLock;
use spill_store::FileHolder;
use std::sync::{Arc, Weak};

/// Shared handle to a buffer's storage slot.
///
/// `None` means the slot is empty: either the record is in its empty
/// state or the contents currently live on disk.
pub(crate) type DataCell = Arc<RwLock<Option<Vec<u8>>>>;

/// How a backing file's content is to be interpreted on restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FileFormat {
    /// A headerless byte dump written by the manager.
    Raw,
    /// Externally produced content (caller-supplied backing).
    Other,
}

/// Registry bookkeeping for one buffer.
pub struct BufferRecord {
    /// Current logical byte length; authoritative whether loaded or dumped.
    pub(crate) size: usize,
    /// True iff the data cell holds the live contents (or the record is
    /// in the empty state). False means the bytes exist only through the
    /// stream factory.
    pub(crate) loaded: bool,
    /// The storage slot, shared with lock tokens and in-memory readers.
    pub(crate) data: DataCell,
    /// Weak view of the current lock marker; lock count = strong count.
    pub(crate) lock_marker: Weak<LockMarker>,
    /// Logical timestamp of the last touching operation.
    pub(crate) last_access: u64,
    /// Backing spill file, set while dumped.
    pub(crate) backing_file: FileHolder,
    /// Interpretation of the backing file.
    pub(crate) file_format: FileFormat,
    /// Produces a fresh reader over the current backing.
    pub(crate) stream_factory: Option<Arc<dyn StreamFactory>>,
    /// True when the factory was supplied by the caller.
    pub(crate) user_stream: bool,
    /// Storage strategy for this buffer.
    pub(crate) alloc_policy: Arc<dyn AllocPolicy>,
}

impl BufferRecord {
    /// Creates a record in the empty state.
    pub(crate) fn new(alloc_policy: Arc<dyn AllocPolicy>) -> Self {
        Self {
            size: 0,
            loaded: true,
            data: Arc::new(RwLock::new(None)),
            lock_marker: Weak::new(),
            last_access: 0,
            backing_file: FileHolder::empty(),
            file_format: FileFormat::Raw,
            stream_factory: None,
            user_stream: false,
            alloc_policy,
        }
    }

    /// Number of outstanding lock tokens.
    pub fn lock_count(&self) -> usize {
        self.lock_marker.strong_count()
    }

    /// True when the record is loaded but holds no storage — freshly
    /// registered or destroyed.
    pub(crate) fn is_empty_slot(&self) -> bool {
        self.loaded && self.data.read().is_none()
    }

    /// Resets the record to the empty state.
    ///
    /// Drops storage, backing file, and stream factory; the lock marker
    /// weak reference is reset (callers must ensure no tokens are
    /// outstanding). `last_access` and the allocation policy survive.
    pub(crate) fn clear(&mut self) {
        self.size = 0;
        self.loaded = true;
        *self.data.write() = None;
        self.lock_marker = Weak::new();
        self.backing_file.clear();
        self.file_format = FileFormat::Raw;
        self.stream_factory = None;
        self.user_stream = false;
    }
}

impl std::fmt::Debug for BufferRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferRecord")
            .field("size", &self.size)
            .field("loaded", &self.loaded)
            .field("lock_count", &self.lock_count())
            .field("last_access", &self.last_access)
            .field("backing_file", &self.backing_file.path())
            .field("file_format", &self.file_format)
            .field("user_stream", &self.user_stream)
            .field("alloc_policy", &self.alloc_policy.name())
            .finish()
    }
}
