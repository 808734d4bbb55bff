// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The worker-side record table and its direct operations.
//!
//! [`Registry`] is only ever touched from the manager's worker thread,
//! which is what makes its plain `BTreeMap` safe without locking. The
//! dump/restore entry points here are the *direct* variants: they run
//! synchronously on the worker and are what dump policies call from
//! their hooks. A hook that posted through the public queue instead
//! would deadlock the single worker waiting on itself, so policies are
//! handed `&mut Registry` and never see the queue.
//!
//! Operations that fire policy hooks take the active policy as an
//! explicit `&mut dyn DumpPolicy` parameter. That lets a policy pass
//! itself back in (`registry.dump_direct(self, id)`) while its own hook
//! is still on the stack — re-entrancy with the borrow checker's
//! blessing.

use crate::lock::LockMarker;
use crate::manager::{Notification, NotificationKind, Task};
use crate::policy::DumpPolicy;
use crate::record::{BufferRecord, FileFormat};
use crate::stats::{BufferInfo, BufferStats};
use crate::stream::{FileStreamFactory, MemoryStreamFactory};
use crate::{BufferError, BufferId, BufferLock};
use crossbeam_channel::Sender;
use spill_store::{create_spill_file, write_raw};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

/// The table of registered buffers plus the manager's logical clock.
pub struct Registry {
    records: BTreeMap<BufferId, BufferRecord>,
    /// Monotonic logical timestamp source; bumped by every touch.
    clock: u64,
    /// Directory spill files are created in.
    spill_dir: PathBuf,
    /// Live notification subscribers.
    subscribers: Vec<Sender<Notification>>,
}

impl Registry {
    pub(crate) fn new(spill_dir: PathBuf) -> Self {
        Self {
            records: BTreeMap::new(),
            clock: 0,
            spill_dir,
            subscribers: Vec::new(),
        }
    }

    // ── Record access ──────────────────────────────────────────

    pub(crate) fn insert(&mut self, id: BufferId, record: BufferRecord) {
        self.records.insert(id, record);
    }

    pub(crate) fn remove(&mut self, id: BufferId) -> Option<BufferRecord> {
        self.records.remove(&id)
    }

    pub(crate) fn get(&self, id: BufferId) -> Result<&BufferRecord, BufferError> {
        self.records.get(&id).ok_or(BufferError::UnknownBuffer(id))
    }

    pub(crate) fn get_mut(&mut self, id: BufferId) -> Result<&mut BufferRecord, BufferError> {
        self.records
            .get_mut(&id)
            .ok_or(BufferError::UnknownBuffer(id))
    }

    /// Number of registered buffers.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no buffers are registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Logical size of a buffer, if registered.
    pub fn size_of(&self, id: BufferId) -> Option<usize> {
        self.records.get(&id).map(|r| r.size)
    }

    /// Residency of a buffer, if registered.
    pub fn is_loaded(&self, id: BufferId) -> Option<bool> {
        self.records.get(&id).map(|r| r.loaded)
    }

    /// Outstanding lock tokens of a buffer, if registered.
    pub fn lock_count_of(&self, id: BufferId) -> Option<usize> {
        self.records.get(&id).map(BufferRecord::lock_count)
    }

    /// Bumps the logical clock and stamps the record.
    pub(crate) fn touch(&mut self, id: BufferId) {
        self.clock += 1;
        if let Some(rec) = self.records.get_mut(&id) {
            rec.last_access = self.clock;
        }
    }

    pub(crate) fn emit(&mut self, id: BufferId, kind: NotificationKind) {
        self.subscribers
            .retain(|tx| tx.send(Notification { id, kind }).is_ok());
    }

    pub(crate) fn add_subscriber(&mut self, tx: Sender<Notification>) {
        self.subscribers.push(tx);
    }

    // ── Eviction ───────────────────────────────────────────────

    /// Buffers eligible for dumping: loaded, unlocked, non-zero size.
    ///
    /// Iteration order is the registry's id order — deterministic, not
    /// recency-based.
    pub fn dump_candidates(&self) -> Vec<(BufferId, usize)> {
        self.records
            .iter()
            .filter(|(_, r)| r.loaded && r.size > 0 && r.lock_count() == 0)
            .map(|(id, r)| (*id, r.size))
            .collect()
    }

    /// Dumps `id` to a fresh spill file. Direct variant: runs here and
    /// now on the worker; this is what policy hooks call.
    ///
    /// Refuses (returning `false`) buffers that are not loaded, have an
    /// outstanding lock, or have zero size. A write failure also returns
    /// `false` and leaves the buffer loaded; the partially written spill
    /// file is deleted by its holder.
    pub fn dump_direct(&mut self, policy: &mut dyn DumpPolicy, id: BufferId) -> bool {
        let Some(rec) = self.records.get_mut(&id) else {
            return false;
        };
        if !rec.loaded || rec.size == 0 || rec.lock_count() > 0 {
            return false;
        }

        let holder = match create_spill_file(&self.spill_dir) {
            Ok(h) => h,
            Err(e) => {
                tracing::error!("dump of {id} failed: {e}");
                return false;
            }
        };
        let path = holder.path().expect("fresh spill file has a path");

        let write_result = {
            let slot = rec.data.read();
            match slot.as_deref() {
                Some(bytes) => write_raw(path, bytes),
                None => return false,
            }
        };
        if let Err(e) = write_result {
            tracing::error!("dump of {id} failed: {e}");
            return false;
        }

        let size = rec.size;
        if let Some(mut buf) = rec.data.write().take() {
            rec.alloc_policy.destroy(&mut buf);
        }
        rec.stream_factory = Some(Arc::new(FileStreamFactory::new(holder.clone())));
        rec.backing_file = holder;
        rec.file_format = FileFormat::Raw;
        rec.loaded = false;

        self.touch(id);
        policy.dump_success(self, id);
        self.emit(id, NotificationKind::Updated);
        tracing::debug!("dumped {id} ({size} bytes)");
        true
    }

    /// Restores `id` from its stream factory. Direct variant.
    ///
    /// A no-op success when already loaded. Reads exactly
    /// `min(requested, stored)` bytes — a short read is fatal for the
    /// attempt: the buffer stays unloaded and `false` is returned.
    pub fn restore_direct(
        &mut self,
        policy: &mut dyn DumpPolicy,
        id: BufferId,
        requested: Option<usize>,
    ) -> bool {
        let (stored, req, factory, alloc, err_path) = {
            let Some(rec) = self.records.get(&id) else {
                return false;
            };
            if rec.loaded {
                return true;
            }
            let Some(factory) = rec.stream_factory.clone() else {
                tracing::error!("restore of {id} failed: no stream factory installed");
                return false;
            };
            let stored = rec.size;
            let err_path = rec
                .backing_file
                .path()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("<stream>"));
            (
                stored,
                requested.unwrap_or(stored),
                factory,
                Arc::clone(&rec.alloc_policy),
                err_path,
            )
        };

        let existing = self
            .records
            .get(&id)
            .and_then(|rec| rec.data.write().take());
        let mut buf = match existing {
            Some(mut old) => {
                if let Err(e) = alloc.reallocate(&mut old, req) {
                    tracing::error!("restore of {id} failed: {e}");
                    if let Ok(rec) = self.get(id) {
                        *rec.data.write() = Some(old);
                    }
                    return false;
                }
                old
            }
            None => match alloc.allocate(req) {
                Ok(fresh) => fresh,
                Err(e) => {
                    tracing::error!("restore of {id} failed: {e}");
                    return false;
                }
            },
        };

        let read_len = req.min(stored);
        let read_result = factory.open().and_then(|reader| {
            spill_store::read_exact_from(reader, &mut buf[..read_len], &err_path)
                .map_err(BufferError::from)
        });
        if let Err(e) = read_result {
            tracing::error!("restore of {id} failed: {e}");
            alloc.destroy(&mut buf);
            return false;
        }

        {
            let rec = self
                .records
                .get_mut(&id)
                .expect("record verified registered above");
            *rec.data.write() = Some(buf);
            rec.size = req;
            rec.loaded = true;
            rec.backing_file.clear();
            rec.file_format = FileFormat::Raw;
            rec.user_stream = false;
            rec.stream_factory = Some(Arc::new(MemoryStreamFactory::new(Arc::clone(&rec.data))));
        }
        self.touch(id);
        policy.restore_success(self, id);
        self.emit(id, NotificationKind::Updated);
        tracing::debug!("restored {id} ({read_len} of {req} bytes from backing)");
        true
    }

    /// Dumps every eligible buffer; returns bytes freed.
    pub fn dump_all_eligible(&mut self, policy: &mut dyn DumpPolicy) -> usize {
        let mut freed = 0;
        for (id, size) in self.dump_candidates() {
            if self.dump_direct(policy, id) {
                freed += size;
            }
        }
        freed
    }

    /// Dumps candidates in registry order until at least `goal` bytes
    /// are freed or candidates run out; returns bytes freed.
    pub fn dump_until_freed(&mut self, policy: &mut dyn DumpPolicy, goal: usize) -> usize {
        let mut freed = 0;
        for (id, size) in self.dump_candidates() {
            if freed >= goal {
                break;
            }
            if self.dump_direct(policy, id) {
                freed += size;
            }
        }
        freed
    }

    // ── Locks & swaps ──────────────────────────────────────────

    /// Produces a lock token for `id`, reusing the live marker if one
    /// exists so the count reflects true outstanding holders.
    pub(crate) fn make_lock(
        &mut self,
        id: BufferId,
        tasks: Sender<Task>,
    ) -> Result<BufferLock, BufferError> {
        self.clock += 1;
        let stamp = self.clock;
        let rec = self.get_mut(id)?;
        rec.last_access = stamp;

        let marker = match rec.lock_marker.upgrade() {
            Some(existing) => existing,
            None => {
                let fresh = Arc::new(LockMarker::new(id, tasks));
                rec.lock_marker = Arc::downgrade(&fresh);
                fresh
            }
        };
        Ok(BufferLock::new(id, marker, Arc::clone(&rec.data)))
    }

    /// Exchanges the two records' contents in one step: storage, size,
    /// residency, backing file, format, stream factory, user flag, and
    /// allocation policy. Lock markers stay put (swapping a locked
    /// buffer is a caller error) and both access stamps are bumped.
    pub(crate) fn swap_records(&mut self, a: BufferId, b: BufferId) -> Result<(), BufferError> {
        if a == b {
            self.touch(a);
            return Ok(());
        }
        let mut ra = self.remove(a).ok_or(BufferError::UnknownBuffer(a))?;
        let mut rb = match self.remove(b) {
            Some(r) => r,
            None => {
                self.insert(a, ra);
                return Err(BufferError::UnknownBuffer(b));
            }
        };
        debug_assert!(
            ra.lock_count() == 0 && rb.lock_count() == 0,
            "swap of locked buffers {a}/{b}"
        );

        std::mem::swap(&mut ra.size, &mut rb.size);
        std::mem::swap(&mut ra.loaded, &mut rb.loaded);
        std::mem::swap(&mut ra.data, &mut rb.data);
        std::mem::swap(&mut ra.backing_file, &mut rb.backing_file);
        std::mem::swap(&mut ra.file_format, &mut rb.file_format);
        std::mem::swap(&mut ra.stream_factory, &mut rb.stream_factory);
        std::mem::swap(&mut ra.user_stream, &mut rb.user_stream);
        std::mem::swap(&mut ra.alloc_policy, &mut rb.alloc_policy);

        self.insert(a, ra);
        self.insert(b, rb);
        self.touch(a);
        self.touch(b);
        self.emit(a, NotificationKind::Updated);
        self.emit(b, NotificationKind::Updated);
        Ok(())
    }

    // ── Diagnostics ────────────────────────────────────────────

    /// Aggregate byte totals, computed as a fold over all records.
    pub fn stats(&self) -> BufferStats {
        self.records
            .values()
            .fold(BufferStats::default(), |mut acc, rec| {
                acc.total_managed += rec.size;
                if !rec.loaded {
                    acc.total_dumped += rec.size;
                }
                acc
            })
    }

    /// Per-buffer snapshots in id order.
    pub fn infos(&self) -> Vec<BufferInfo> {
        self.records
            .iter()
            .map(|(id, rec)| BufferInfo {
                id: *id,
                size: rec.size,
                loaded: rec.loaded,
                lock_count: rec.lock_count(),
                last_access: rec.last_access,
                alloc_policy: rec.alloc_policy.name(),
                user_stream: rec.user_stream,
                backing_path: rec.backing_file.path().map(PathBuf::from),
            })
            .collect()
    }

    /// Fixed-width table of the whole registry, for logs.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<10} {:>12} {:<7} {:>8} {:>6} {:<8} backing",
            "buffer", "size", "policy", "access", "locks", "state",
        );
        for (id, rec) in &self.records {
            let state = if rec.loaded { "loaded" } else { "dumped" };
            let backing = rec
                .backing_file
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".into());
            let _ = writeln!(
                out,
                "{:<10} {:>12} {:<7} {:>8} {:>6} {:<8} {}",
                id.to_string(),
                rec.size,
                rec.alloc_policy.name(),
                rec.last_access,
                rec.lock_count(),
                state,
                backing,
            );
        }
        out
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("buffers", &self.records.len())
            .field("clock", &self.clock)
            .field("spill_dir", &self.spill_dir)
            .finish()
    }
}
