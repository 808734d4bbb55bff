// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the buffer manager.

use crate::BufferId;

/// Errors that can occur during buffer lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// The handle does not name a registered buffer.
    #[error("unknown buffer {0}")]
    UnknownBuffer(BufferId),

    /// Attempted to allocate or set a zero-sized buffer.
    #[error("cannot allocate zero-sized buffer")]
    ZeroSized,

    /// The allocation policy could not provide the requested memory.
    #[error("allocation of {requested} bytes failed: {detail}")]
    Alloc { requested: usize, detail: String },

    /// A restore was required but could not be completed.
    #[error("restore failed for buffer {0}")]
    RestoreFailed(BufferId),

    /// The buffer has no stream factory to read from.
    #[error("buffer {0} has no backing stream")]
    NoBacking(BufferId),

    /// Spill-file I/O failed.
    #[error("spill I/O error: {0}")]
    Spill(#[from] spill_store::SpillError),

    /// The named dump policy does not exist.
    #[error("unknown dump policy '{0}': expected 'never', 'always', 'barrier', or 'valve'")]
    UnknownPolicy(String),

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The worker is shut down, or the operation did not complete.
    #[error("buffer manager worker is unavailable or the operation did not complete")]
    WorkerGone,
}
