// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Registry diagnostics: aggregate stats and per-buffer snapshots.

use crate::BufferId;
use std::path::PathBuf;

/// Aggregate byte totals over the whole registry.
///
/// `total_managed` counts every registered buffer's logical size,
/// loaded or dumped; `total_dumped` counts only the dumped ones, so
/// `total_dumped <= total_managed` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BufferStats {
    /// Bytes across all registered buffers (loaded + dumped).
    pub total_managed: usize,
    /// Bytes currently evicted to spill files.
    pub total_dumped: usize,
}

impl BufferStats {
    /// Bytes currently resident in memory.
    pub fn total_resident(&self) -> usize {
        self.total_managed - self.total_dumped
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "managed {} bytes ({} resident, {} dumped)",
            self.total_managed,
            self.total_resident(),
            self.total_dumped,
        )
    }
}

/// Point-in-time snapshot of one buffer's bookkeeping.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BufferInfo {
    /// Registry handle.
    pub id: BufferId,
    /// Logical byte length.
    pub size: usize,
    /// True when resident in memory.
    pub loaded: bool,
    /// Outstanding lock tokens.
    pub lock_count: usize,
    /// Logical timestamp of the last touching operation.
    pub last_access: u64,
    /// Allocation policy name.
    pub alloc_policy: &'static str,
    /// True when the stream factory is caller-supplied.
    pub user_stream: bool,
    /// Backing file path while dumped.
    pub backing_path: Option<PathBuf>,
}
