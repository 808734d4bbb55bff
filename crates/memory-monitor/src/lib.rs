// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-monitor
//!
//! Answers one question: how much memory can the process still claim
//! without pushing the system into swap?
//!
//! The kernel's own estimate, `MemAvailable` from `/proc/meminfo`,
//! accounts for free pages plus reclaimable buffers and cache, which
//! makes it the right input for eviction decisions — `MemFree` alone
//! badly understates headroom on any machine with a warm page cache.
//!
//! Reads are cheap (one small procfs file) and suitable for querying on
//! every allocation-sized event.
//!
//! # Example
//! ```no_run
//! use memory_monitor::FreeMemory;
//!
//! let mem = FreeMemory::query().unwrap();
//! println!(
//!     "{} of {} bytes available",
//!     mem.available_bytes, mem.total_bytes
//! );
//! ```

mod error;
mod probe;

pub use error::MonitorError;
pub use probe::FreeMemory;
