// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # buffer-manager
//!
//! Transparent dump/restore memory management for large binary buffers.
//! Registered buffers can be evicted ("dumped") to temporary spill files
//! under memory pressure and reloaded ("restored") on demand; scoped
//! lock tokens keep a buffer resident while it is in use.
//!
//! # Key Components
//!
//! - [`BufferManager`] — the registry and public API. Every operation
//!   is serialized through one worker thread and returns an
//!   [`OpHandle`] for a blocking wait.
//! - [`BufferLock`] — an RAII residency token. While any clone exists,
//!   the buffer cannot be dumped; the bytes are readable through the
//!   token without a worker round-trip.
//! - [`DumpPolicy`] — pluggable eviction strategy ([`NeverDump`],
//!   [`AlwaysDump`], [`BarrierDump`], [`ValveDump`]), invoked at every
//!   mutation point.
//! - [`AllocPolicy`] — pluggable storage strategy ([`HeapAlloc`],
//!   [`ScrubAlloc`]).
//! - [`StreamFactory`] — produces fresh readers over a buffer's current
//!   backing, in memory or on disk.
//!
//! # Architecture
//!
//! ```text
//!  caller threads                   worker thread
//!  ──────────────                   ─────────────────────────────
//!  BufferManager ──task queue──►    Registry ◄──hooks──► DumpPolicy
//!       │                             │                     │
//!       ▼                             ▼                     ▼
//!   OpHandle::wait()              BufferRecord         dump_direct()
//!       ▲                         (data cell)          restore_direct()
//!       │                             │
//!   BufferLock ◄──shared data cell────┘
//! ```
//!
//! All bookkeeping mutation happens on the worker, in submission order;
//! policy hooks run there too and evict re-entrantly through the
//! registry's direct operations. The only state shared outward is the
//! per-buffer data cell (reached through lock tokens) and the lock
//! markers themselves.
//!
//! # Example
//! ```
//! use buffer_manager::{BufferManager, HeapAlloc, ManagerConfig};
//!
//! # let dir = tempfile::tempdir().unwrap();
//! # let config = ManagerConfig { spill_dir: Some(dir.path().to_path_buf()), ..Default::default() };
//! let manager = BufferManager::with_config(config).unwrap();
//! let id = manager.register();
//! manager.allocate(id, 4096, HeapAlloc::shared()).wait().unwrap();
//!
//! // Evict to disk, reload on demand.
//! assert!(manager.dump(id).wait().unwrap());
//! let lock = manager.lock(id).wait().unwrap(); // restore-on-lock
//! assert_eq!(lock.bytes().len(), 4096);
//! ```

mod alloc;
mod budget;
mod config;
mod error;
mod handle;
mod lock;
mod manager;
pub mod policy;
mod record;
mod registry;
mod stats;
mod stream;

pub use alloc::{AllocPolicy, HeapAlloc, ScrubAlloc};
pub use budget::ByteSize;
pub use config::{LoadingMode, ManagerConfig};
pub use error::BufferError;
pub use handle::BufferId;
pub use lock::BufferLock;
pub use manager::{BufferManager, Notification, NotificationKind, OpHandle};
pub use policy::{
    create_policy, AlwaysDump, BarrierDump, DumpPolicy, MemoryProbe, NeverDump, SystemProbe,
    ValveDump,
};
pub use record::FileFormat;
pub use registry::Registry;
pub use stats::{BufferInfo, BufferStats};
pub use stream::{FileStreamFactory, StreamFactory, StreamInfo};
