// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The buffer manager: a serialized public API over one worker thread.
//!
//! Every public operation is packaged as a task, posted to a FIFO
//! queue, and executed by the manager's single worker in submission
//! order. Callers get an [`OpHandle`] back immediately and block on
//! [`OpHandle::wait`] only if they need the result. Because nothing but
//! the worker ever touches the registry, no locking protects it — total
//! ordering is the synchronization.
//!
//! The trade-off is explicit: every operation, reads included, pays one
//! cross-thread round-trip, and a slow disk during dump/restore stalls
//! all buffer operations process-wide. Consistency over throughput.
//!
//! # Lifecycle contract for buffer owners
//!
//! ```no_run
//! use buffer_manager::{BufferManager, HeapAlloc};
//!
//! let manager = BufferManager::new();
//! let id = manager.register();                       // on construction
//! manager.allocate(id, 1 << 20, HeapAlloc::shared()) // acquire storage
//!     .wait().unwrap();
//! {
//!     let lock = manager.lock(id).wait().unwrap();   // around every access
//!     let _first = lock.bytes()[0];
//! }                                                  // token drop re-enables eviction
//! manager.unregister(id).wait().unwrap();            // on destruction
//! ```

use crate::alloc::{AllocPolicy, HeapAlloc};
use crate::config::{LoadingMode, ManagerConfig};
use crate::handle::next_buffer_id;
use crate::policy::{self, DumpPolicy};
use crate::record::{BufferRecord, FileFormat};
use crate::registry::Registry;
use crate::stats::{BufferInfo, BufferStats};
use crate::stream::{MemoryStreamFactory, StreamFactory, StreamInfo};
use crate::{BufferError, BufferId, BufferLock};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use spill_store::FileHolder;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

// ── Worker plumbing ────────────────────────────────────────────

/// A unit of work for the worker thread.
pub(crate) enum Task {
    /// Execute on the worker; the closure delivers its own result.
    Run(Box<dyn FnOnce(&mut Core) + Send>),
    /// Stop the worker after draining everything queued before this.
    Shutdown,
}

/// Worker-side state: the registry, the active policy, and the queue
/// sender lock markers use to report releases.
pub(crate) struct Core {
    pub(crate) registry: Registry,
    pub(crate) policy: Box<dyn DumpPolicy>,
    pub(crate) loading: LoadingMode,
    pub(crate) tasks: Sender<Task>,
}

impl Core {
    /// Reacts to the release of a buffer's last lock token.
    pub(crate) fn on_unlocked(&mut self, id: BufferId) {
        self.policy.unlock_request(&mut self.registry, id);
        self.registry.touch(id);
    }
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

// ── Result handles ─────────────────────────────────────────────

/// Handle to the result of a queued operation.
///
/// The operation executes regardless of whether anyone waits; dropping
/// the handle merely abandons interest in the outcome. Errors raised on
/// the worker — including panics from programming-error assertions —
/// surface here, at the blocking wait, not at submission.
#[must_use = "the operation runs anyway, but errors surface only at wait()"]
pub struct OpHandle<T> {
    rx: Option<Receiver<Result<T, BufferError>>>,
}

impl<T> OpHandle<T> {
    /// Blocks until the operation has executed and returns its result.
    pub fn wait(self) -> Result<T, BufferError> {
        match self.rx {
            Some(rx) => rx.recv().unwrap_or(Err(BufferError::WorkerGone)),
            None => Err(BufferError::WorkerGone),
        }
    }
}

// ── Notifications ──────────────────────────────────────────────

/// Registry-change event delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub id: BufferId,
    pub kind: NotificationKind,
}

/// What happened to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// The record was created or mutated.
    Updated,
    /// The record was unregistered.
    Removed,
}

// ── The manager ────────────────────────────────────────────────

/// Registry of dump/restore-managed buffers behind one worker thread.
///
/// See the [module docs](self) for the concurrency contract and the
/// owner lifecycle.
pub struct BufferManager {
    tasks: Sender<Task>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

static GLOBAL: OnceLock<BufferManager> = OnceLock::new();

impl BufferManager {
    /// Creates a manager with the default configuration (policy
    /// `"never"`, lazy loading, system temp directory for spill files).
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default()).expect("default configuration is valid")
    }

    /// Creates a manager from a configuration.
    pub fn with_config(config: ManagerConfig) -> Result<Self, BufferError> {
        let loading = config.parse_loading_mode()?;
        let policy = config.create_policy()?;
        let spill_dir = config.resolve_spill_dir();
        std::fs::create_dir_all(&spill_dir).map_err(|e| {
            BufferError::Config(format!(
                "cannot create spill directory '{}': {e}",
                spill_dir.display()
            ))
        })?;

        let (tasks, queue) = unbounded();
        let worker_tasks = tasks.clone();
        let worker = std::thread::Builder::new()
            .name("buffer-manager".into())
            .spawn(move || run_worker(queue, worker_tasks, spill_dir, policy, loading))
            .map_err(|e| BufferError::Config(format!("cannot spawn worker thread: {e}")))?;

        Ok(Self {
            tasks,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// The process-wide manager, created on first use with the default
    /// configuration.
    pub fn global() -> &'static BufferManager {
        GLOBAL.get_or_init(BufferManager::new)
    }

    fn submit<T, F>(&self, op: F) -> OpHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Core) -> Result<T, BufferError> + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let task = Task::Run(Box::new(move |core: &mut Core| {
            let _ = tx.send(op(core));
        }));
        match self.tasks.send(task) {
            Ok(()) => OpHandle { rx: Some(rx) },
            Err(_) => OpHandle { rx: None },
        }
    }

    // ── Registration ───────────────────────────────────────────

    /// Registers a fresh buffer and returns its handle.
    ///
    /// The id is assigned immediately; the record insertion is queued
    /// and ordered before any subsequent operation on the same id.
    pub fn register(&self) -> BufferId {
        let id = next_buffer_id();
        let _ = self.submit(move |core| {
            core.registry.insert(id, BufferRecord::new(HeapAlloc::shared()));
            core.registry.touch(id);
            core.registry
                .emit(id, NotificationKind::Updated);
            tracing::debug!("registered {id}");
            Ok(())
        });
        id
    }

    /// Removes a buffer's record. The buffer must have no outstanding
    /// lock tokens — violating that is a programming error that trips
    /// an assertion and leaves the record in place.
    pub fn unregister(&self, id: BufferId) -> OpHandle<()> {
        self.submit(move |core| {
            let locks = core.registry.lock_count_of(id).unwrap_or(0);
            debug_assert!(
                locks == 0,
                "unregister of {id} with {locks} outstanding lock tokens"
            );
            match core.registry.remove(id) {
                Some(_) => {
                    core.registry.emit(id, NotificationKind::Removed);
                    tracing::debug!("unregistered {id}");
                    Ok(())
                }
                None => Err(BufferError::UnknownBuffer(id)),
            }
        })
    }

    // ── Storage lifecycle ──────────────────────────────────────

    /// Allocates `size` bytes for `id` through `alloc`.
    ///
    /// The active dump policy sees the request *before* the allocation,
    /// so it can evict other buffers to make room. On allocation
    /// failure the record is reset to its empty state and the error is
    /// delivered through the handle.
    pub fn allocate(
        &self,
        id: BufferId,
        size: usize,
        alloc: Arc<dyn AllocPolicy>,
    ) -> OpHandle<()> {
        self.submit(move |core| {
            core.policy.allocation_request(&mut core.registry, id, size);
            let empty_slot = core.registry.get(id)?.is_empty_slot();
            debug_assert!(
                empty_slot,
                "allocate on {id} which already holds a live allocation"
            );
            match alloc.allocate(size) {
                Ok(buf) => {
                    let rec = core.registry.get_mut(id)?;
                    *rec.data.write() = Some(buf);
                    rec.size = size;
                    rec.loaded = true;
                    rec.backing_file.clear();
                    rec.file_format = FileFormat::Raw;
                    rec.user_stream = false;
                    rec.alloc_policy = alloc;
                    rec.stream_factory =
                        Some(Arc::new(MemoryStreamFactory::new(Arc::clone(&rec.data))));
                    core.registry.touch(id);
                    core.registry.emit(id, NotificationKind::Updated);
                    tracing::debug!("allocated {size} bytes for {id}");
                    Ok(())
                }
                Err(e) => {
                    if let Ok(rec) = core.registry.get_mut(id) {
                        rec.clear();
                    }
                    core.registry.emit(id, NotificationKind::Updated);
                    Err(e)
                }
            }
        })
    }

    /// Adopts caller-owned memory as `id`'s storage.
    pub fn set(&self, id: BufferId, bytes: Vec<u8>, alloc: Arc<dyn AllocPolicy>) -> OpHandle<()> {
        self.submit(move |core| {
            let size = bytes.len();
            if size == 0 {
                return Err(BufferError::ZeroSized);
            }
            core.policy.set_request(&mut core.registry, id, size);
            let rec = core.registry.get_mut(id)?;
            debug_assert!(
                rec.is_empty_slot(),
                "set on {id} which already holds a live allocation"
            );
            *rec.data.write() = Some(bytes);
            rec.size = size;
            rec.loaded = true;
            rec.backing_file.clear();
            rec.file_format = FileFormat::Other;
            rec.user_stream = false;
            rec.alloc_policy = alloc;
            rec.stream_factory = Some(Arc::new(MemoryStreamFactory::new(Arc::clone(&rec.data))));
            core.registry.touch(id);
            core.registry.emit(id, NotificationKind::Updated);
            tracing::debug!("adopted {size} external bytes for {id}");
            Ok(())
        })
    }

    /// Resizes `id` to `new_size` bytes, preserving the leading bytes.
    ///
    /// A dumped buffer is restored at the new size instead of resizing
    /// a missing allocation. On failure the record is left fully rolled
    /// back — old storage, old size, old factory.
    pub fn reallocate(&self, id: BufferId, new_size: usize) -> OpHandle<()> {
        self.submit(move |core| {
            core.policy
                .reallocate_request(&mut core.registry, id, new_size);
            let loaded = core
                .registry
                .is_loaded(id)
                .ok_or(BufferError::UnknownBuffer(id))?;
            if !loaded {
                return if core
                    .registry
                    .restore_direct(core.policy.as_mut(), id, Some(new_size))
                {
                    Ok(())
                } else {
                    Err(BufferError::RestoreFailed(id))
                };
            }

            let result = {
                let rec = core.registry.get_mut(id)?;
                let mut slot = rec.data.write();
                match slot.as_mut() {
                    Some(buf) => rec.alloc_policy.reallocate(buf, new_size),
                    // Empty slot: a reallocation from nothing is an allocation.
                    None => rec.alloc_policy.allocate(new_size).map(|buf| {
                        *slot = Some(buf);
                    }),
                }
            };
            match result {
                Ok(()) => {
                    let rec = core.registry.get_mut(id)?;
                    rec.size = new_size;
                    rec.stream_factory =
                        Some(Arc::new(MemoryStreamFactory::new(Arc::clone(&rec.data))));
                    core.registry.touch(id);
                    core.registry.emit(id, NotificationKind::Updated);
                    Ok(())
                }
                Err(e) => {
                    core.registry.emit(id, NotificationKind::Updated);
                    Err(e)
                }
            }
        })
    }

    /// Releases `id`'s storage and resets the record to empty.
    pub fn destroy(&self, id: BufferId) -> OpHandle<()> {
        self.submit(move |core| {
            core.policy.destroy_request(&mut core.registry, id);
            let rec = core.registry.get_mut(id)?;
            if let Some(mut buf) = rec.data.write().take() {
                rec.alloc_policy.destroy(&mut buf);
            }
            rec.clear();
            core.registry.touch(id);
            core.registry.emit(id, NotificationKind::Updated);
            tracing::debug!("destroyed {id}");
            Ok(())
        })
    }

    /// Exchanges the two buffers' storage and bookkeeping in one atomic
    /// step. Pure bookkeeping: no policy hook fires.
    pub fn swap(&self, a: BufferId, b: BufferId) -> OpHandle<()> {
        self.submit(move |core| core.registry.swap_records(a, b))
    }

    // ── Residency ──────────────────────────────────────────────

    /// Produces a lock token guaranteeing `id` stays loaded.
    ///
    /// A dumped buffer is restored before the token is produced, inside
    /// the same task — nothing can interleave between the residency
    /// check and the restore.
    pub fn lock(&self, id: BufferId) -> OpHandle<BufferLock> {
        self.submit(move |core| {
            core.policy.lock_request(&mut core.registry, id);
            if core.registry.is_loaded(id) == Some(false)
                && !core.registry.restore_direct(core.policy.as_mut(), id, None)
            {
                return Err(BufferError::RestoreFailed(id));
            }
            core.registry.make_lock(id, core.tasks.clone())
        })
    }

    /// Lets the policy react to a lock release.
    ///
    /// The lock count itself is driven purely by token lifetime; tokens
    /// call this automatically when the last holder drops.
    pub fn unlock(&self, id: BufferId) -> OpHandle<()> {
        self.submit(move |core| {
            core.on_unlocked(id);
            Ok(())
        })
    }

    /// Evicts `id` to a fresh spill file.
    ///
    /// Returns `false` without side effects when the buffer is not
    /// loaded, is locked, or has zero size.
    pub fn dump(&self, id: BufferId) -> OpHandle<bool> {
        self.submit(move |core| Ok(core.registry.dump_direct(core.policy.as_mut(), id)))
    }

    /// Reloads `id` from its backing stream. A no-op success when
    /// already loaded.
    pub fn restore(&self, id: BufferId) -> OpHandle<bool> {
        self.submit(move |core| Ok(core.registry.restore_direct(core.policy.as_mut(), id, None)))
    }

    /// Like [`restore`](Self::restore), but materializes the buffer at
    /// `size` bytes, reading `min(size, stored)` bytes from the backing.
    pub fn restore_with_size(&self, id: BufferId, size: usize) -> OpHandle<bool> {
        self.submit(move |core| {
            Ok(core
                .registry
                .restore_direct(core.policy.as_mut(), id, Some(size)))
        })
    }

    // ── Custom backings ────────────────────────────────────────

    /// Installs a caller-supplied backing for `id` without
    /// materializing it: the record becomes dumped with a user stream.
    ///
    /// Under [`LoadingMode::Direct`] the buffer is restored before this
    /// operation completes; under [`LoadingMode::Lazy`] it stays dumped
    /// until the first lock.
    pub fn set_stream_factory(
        &self,
        id: BufferId,
        factory: Arc<dyn StreamFactory>,
        size: usize,
        backing: FileHolder,
        format: FileFormat,
        alloc: Arc<dyn AllocPolicy>,
    ) -> OpHandle<()> {
        self.submit(move |core| {
            {
                let rec = core.registry.get_mut(id)?;
                if let Some(mut old) = rec.data.write().take() {
                    rec.alloc_policy.destroy(&mut old);
                }
                rec.size = size;
                rec.loaded = false;
                rec.backing_file = backing;
                rec.file_format = format;
                rec.stream_factory = Some(factory);
                rec.user_stream = true;
                rec.alloc_policy = alloc;
            }
            core.registry.touch(id);
            core.registry.emit(id, NotificationKind::Updated);
            if core.loading == LoadingMode::Direct
                && !core.registry.restore_direct(core.policy.as_mut(), id, None)
            {
                return Err(BufferError::RestoreFailed(id));
            }
            Ok(())
        })
    }

    /// Snapshot of `id`'s backing plus a fresh reader over its bytes.
    ///
    /// For a loaded buffer the snapshot holds a lock token, so the
    /// source cannot be dumped while the reader is alive. A dumped
    /// buffer streams straight off its backing without being loaded.
    pub fn get_stream_info(&self, id: BufferId) -> OpHandle<StreamInfo> {
        self.submit(move |core| {
            let (size, format, user_stream, backing_path, factory, loaded) = {
                let rec = core.registry.get(id)?;
                (
                    rec.size,
                    rec.file_format,
                    rec.user_stream,
                    rec.backing_file.path().map(PathBuf::from),
                    rec.stream_factory
                        .clone()
                        .ok_or(BufferError::NoBacking(id))?,
                    rec.loaded,
                )
            };
            let pin = if loaded {
                Some(core.registry.make_lock(id, core.tasks.clone())?)
            } else {
                None
            };
            let reader = factory.open()?;
            core.registry.touch(id);
            Ok(StreamInfo {
                id,
                size,
                format,
                user_stream,
                backing_path,
                reader,
                _pin: pin,
            })
        })
    }

    // ── Policy management ──────────────────────────────────────

    /// Swaps in a new dump policy; its `refresh` hook runs against the
    /// current registry before any further operation.
    pub fn set_policy(&self, policy: Box<dyn DumpPolicy>) -> OpHandle<()> {
        self.submit(move |core| {
            tracing::info!("dump policy set to '{}'", policy.name());
            core.policy = policy;
            core.policy.refresh(&mut core.registry);
            Ok(())
        })
    }

    /// Swaps in a policy by configuration name.
    pub fn set_policy_name(&self, name: impl Into<String>) -> OpHandle<()> {
        let name = name.into();
        self.submit(move |core| {
            let policy = policy::create_policy(&name)?;
            tracing::info!("dump policy set to '{}'", policy.name());
            core.policy = policy;
            core.policy.refresh(&mut core.registry);
            Ok(())
        })
    }

    /// Name of the active policy.
    pub fn policy_name(&self) -> OpHandle<String> {
        self.submit(|core| Ok(core.policy.name().to_string()))
    }

    /// Sets a tuning parameter on the active policy. `false` means the
    /// name or value was rejected (and logged).
    pub fn set_policy_param(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> OpHandle<bool> {
        let name = name.into();
        let value = value.into();
        self.submit(move |core| Ok(core.policy.set_param(&name, &value)))
    }

    /// Reads a tuning parameter from the active policy.
    pub fn get_policy_param(&self, name: impl Into<String>) -> OpHandle<Option<String>> {
        let name = name.into();
        self.submit(move |core| Ok(core.policy.get_param(&name)))
    }

    /// Parameter names the active policy accepts.
    pub fn policy_param_names(&self) -> OpHandle<Vec<&'static str>> {
        self.submit(|core| Ok(core.policy.param_names().to_vec()))
    }

    /// Changes how caller-supplied backings materialize.
    pub fn set_loading_mode(&self, mode: LoadingMode) -> OpHandle<()> {
        self.submit(move |core| {
            core.loading = mode;
            Ok(())
        })
    }

    // ── Diagnostics ────────────────────────────────────────────

    /// Per-buffer snapshots in id order.
    pub fn get_buffer_infos(&self) -> OpHandle<Vec<BufferInfo>> {
        self.submit(|core| Ok(core.registry.infos()))
    }

    /// Aggregate byte totals over the registry.
    pub fn get_buffer_stats(&self) -> OpHandle<BufferStats> {
        self.submit(|core| Ok(core.registry.stats()))
    }

    /// Fixed-width table of the whole registry, for logs.
    pub fn render_table(&self) -> OpHandle<String> {
        self.submit(|core| Ok(core.registry.render_table()))
    }

    /// Subscribes to registry-change notifications.
    pub fn subscribe(&self) -> OpHandle<Receiver<Notification>> {
        self.submit(|core| {
            let (tx, rx) = unbounded();
            core.registry.add_subscriber(tx);
            Ok(rx)
        })
    }

    // ── Teardown ───────────────────────────────────────────────

    /// Stops the worker after draining every previously queued task.
    ///
    /// Buffers still dumped at this point are discarded: their spill
    /// files are deleted with the registry. The registry is in-process
    /// state only, so restoring bytes nobody can reach again would buy
    /// nothing but disk reads.
    pub fn shutdown(&self) {
        let _ = self.tasks.send(Task::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!("buffer manager worker terminated abnormally");
            }
        }
    }
}

fn run_worker(
    queue: Receiver<Task>,
    tasks: Sender<Task>,
    spill_dir: PathBuf,
    policy: Box<dyn DumpPolicy>,
    loading: LoadingMode,
) {
    let mut core = Core {
        registry: Registry::new(spill_dir),
        policy,
        loading,
        tasks,
    };
    tracing::info!(
        "buffer manager worker started (policy '{}')",
        core.policy.name()
    );
    core.policy.refresh(&mut core.registry);

    while let Ok(task) = queue.recv() {
        match task {
            Task::Run(op) => {
                // A panicking task (programming-error assertion) must
                // not take the whole registry down with it; the caller
                // sees the failure through its abandoned handle.
                if let Err(panic) =
                    std::panic::catch_unwind(AssertUnwindSafe(|| op(&mut core)))
                {
                    tracing::error!("buffer operation panicked: {}", panic_detail(&*panic));
                }
            }
            Task::Shutdown => break,
        }
    }
    tracing::info!("buffer manager worker stopped");
}

impl Default for BufferManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferManager")
            .field("running", &self.worker.lock().is_some())
            .finish()
    }
}
