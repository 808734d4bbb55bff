// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Opaque buffer handles.
//!
//! A [`BufferId`] is the registry key an application holds in place of
//! the buffer itself. Ids come from a process-wide counter and are never
//! reused, so a stale handle can only miss — it can never alias a
//! different buffer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identity of a registered buffer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct BufferId(u64);

impl BufferId {
    /// Returns the raw id value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// Process-wide id counter. Starts at 1 so 0 never names a buffer.
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the next buffer id.
pub(crate) fn next_buffer_id() -> BufferId {
    BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let a = next_buffer_id();
        let b = next_buffer_id();
        assert!(b.as_u64() > a.as_u64());
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        let id = next_buffer_id();
        assert_eq!(format!("{id}"), format!("buf#{}", id.as_u64()));
    }
}
