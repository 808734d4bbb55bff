// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation policies.
//!
//! An [`AllocPolicy`] owns the allocate/reallocate/destroy mechanics for
//! a buffer's storage. The manager never touches memory directly — it
//! delegates to the record's policy, so buffers with different lifetime
//! requirements (e.g. sensitive payloads that must be scrubbed) coexist
//! in one registry.
//!
//! Policies are purely algorithmic — no I/O, no registry access — which
//! keeps them trivially unit-testable.

use crate::BufferError;

/// Strategy for providing and releasing a buffer's storage.
///
/// # Contract
/// - `allocate` returns zero-initialized storage of exactly `size` bytes.
/// - `reallocate` preserves the leading `min(old, new)` bytes; on error
///   the buffer MUST be left unchanged (the manager relies on this for
///   rollback).
/// - `destroy` is called before the storage is released; it must not
///   change the buffer's length.
pub trait AllocPolicy: Send + Sync {
    /// Human-readable policy name (diagnostics).
    fn name(&self) -> &'static str;

    /// Allocates `size` bytes of zero-initialized storage.
    fn allocate(&self, size: usize) -> Result<Vec<u8>, BufferError>;

    /// Resizes `buf` to `new_size` bytes, preserving the leading
    /// `min(old, new)` bytes. Leaves `buf` unchanged on error.
    fn reallocate(&self, buf: &mut Vec<u8>, new_size: usize) -> Result<(), BufferError>;

    /// Hook invoked before the storage is released.
    fn destroy(&self, buf: &mut Vec<u8>);
}

fn fallible_grow(buf: &mut Vec<u8>, new_size: usize) -> Result<(), BufferError> {
    let additional = new_size - buf.len();
    buf.try_reserve_exact(additional)
        .map_err(|e| BufferError::Alloc {
            requested: new_size,
            detail: e.to_string(),
        })?;
    buf.resize(new_size, 0);
    Ok(())
}

/// Plain heap allocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAlloc;

impl HeapAlloc {
    /// Returns a shared handle to the policy, ready for registration.
    pub fn shared() -> std::sync::Arc<dyn AllocPolicy> {
        std::sync::Arc::new(Self)
    }
}

impl AllocPolicy for HeapAlloc {
    fn name(&self) -> &'static str {
        "heap"
    }

    fn allocate(&self, size: usize) -> Result<Vec<u8>, BufferError> {
        if size == 0 {
            return Err(BufferError::ZeroSized);
        }
        let mut buf = Vec::new();
        fallible_grow(&mut buf, size)?;
        Ok(buf)
    }

    fn reallocate(&self, buf: &mut Vec<u8>, new_size: usize) -> Result<(), BufferError> {
        if new_size == 0 {
            return Err(BufferError::ZeroSized);
        }
        if new_size > buf.len() {
            fallible_grow(buf, new_size)?;
        } else {
            buf.truncate(new_size);
            buf.shrink_to_fit();
        }
        Ok(())
    }

    fn destroy(&self, _buf: &mut Vec<u8>) {}
}

/// Heap allocation that zero-scrubs storage before release.
///
/// For payloads that should not linger in freed memory. Scrubbing also
/// runs on the truncated tail when a reallocation shrinks the buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrubAlloc;

impl ScrubAlloc {
    /// Returns a shared handle to the policy, ready for registration.
    pub fn shared() -> std::sync::Arc<dyn AllocPolicy> {
        std::sync::Arc::new(Self)
    }
}

impl AllocPolicy for ScrubAlloc {
    fn name(&self) -> &'static str {
        "scrub"
    }

    fn allocate(&self, size: usize) -> Result<Vec<u8>, BufferError> {
        HeapAlloc.allocate(size)
    }

    fn reallocate(&self, buf: &mut Vec<u8>, new_size: usize) -> Result<(), BufferError> {
        if new_size == 0 {
            return Err(BufferError::ZeroSized);
        }
        if new_size < buf.len() {
            buf[new_size..].fill(0);
        }
        HeapAlloc.reallocate(buf, new_size)
    }

    fn destroy(&self, buf: &mut Vec<u8>) {
        buf.fill(0);
    }
}
