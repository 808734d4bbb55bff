// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`DumpPolicy`] trait and the built-in eviction policies.
//!
//! A dump policy decides *when* buffers get evicted. The manager calls
//! into the active policy at eight hook points covering every mutation,
//! handing it `&mut Registry` so it can dump other buffers on the spot
//! through the registry's direct operations — same thread, no queue.
//!
//! Policies are tuned at runtime through a small string-keyed parameter
//! surface; values are byte-size strings (`"500MB"`). A malformed value
//! is logged and reported as `false`, never a panic.

pub mod always;
pub mod barrier;
pub mod never;
pub mod valve;

pub use always::AlwaysDump;
pub use barrier::BarrierDump;
pub use never::NeverDump;
pub use valve::{MemoryProbe, SystemProbe, ValveDump};

use crate::registry::Registry;
use crate::{BufferError, BufferId};

/// Eviction strategy invoked at the manager's mutation points.
///
/// Every hook has a no-op default, so a policy implements only the
/// events it cares about. Hooks run on the manager's worker thread with
/// the registry in a fully consistent state; a hook may call
/// [`Registry::dump_direct`] (passing itself as the policy) to evict
/// other buffers re-entrantly.
pub trait DumpPolicy: Send {
    /// Policy name, as used by the configuration factory.
    fn name(&self) -> &'static str;

    /// Called when the policy becomes active, with the current registry.
    fn refresh(&mut self, _reg: &mut Registry) {}

    /// A buffer of `size` bytes is about to be allocated.
    fn allocation_request(&mut self, _reg: &mut Registry, _id: BufferId, _size: usize) {}

    /// Caller-owned memory of `size` bytes is about to be adopted.
    fn set_request(&mut self, _reg: &mut Registry, _id: BufferId, _size: usize) {}

    /// A buffer is about to be resized to `new_size` bytes.
    fn reallocate_request(&mut self, _reg: &mut Registry, _id: BufferId, _new_size: usize) {}

    /// A buffer's storage is about to be released.
    fn destroy_request(&mut self, _reg: &mut Registry, _id: BufferId) {}

    /// A lock token is about to be produced.
    fn lock_request(&mut self, _reg: &mut Registry, _id: BufferId) {}

    /// A lock token was released.
    fn unlock_request(&mut self, _reg: &mut Registry, _id: BufferId) {}

    /// A buffer was dumped to its spill file.
    fn dump_success(&mut self, _reg: &mut Registry, _id: BufferId) {}

    /// A buffer was restored into memory.
    fn restore_success(&mut self, _reg: &mut Registry, _id: BufferId) {}

    /// Sets a tuning parameter. Returns `false` (and logs) on unknown
    /// names or malformed values.
    fn set_param(&mut self, _name: &str, _value: &str) -> bool {
        false
    }

    /// Reads a tuning parameter, formatted so it re-parses to the same
    /// value.
    fn get_param(&self, _name: &str) -> Option<String> {
        None
    }

    /// Names accepted by [`set_param`](DumpPolicy::set_param).
    fn param_names(&self) -> &[&'static str] {
        &[]
    }
}

/// Creates a policy by configuration name.
///
/// Accepted names: `"never"`, `"always"`, `"barrier"`, `"valve"`
/// (case-insensitive).
pub fn create_policy(name: &str) -> Result<Box<dyn DumpPolicy>, BufferError> {
    match name.to_lowercase().as_str() {
        "never" => Ok(Box::new(NeverDump)),
        "always" => Ok(Box::new(AlwaysDump)),
        "barrier" => Ok(Box::new(BarrierDump::new())),
        "valve" => Ok(Box::new(ValveDump::system())),
        other => Err(BufferError::UnknownPolicy(other.to_string())),
    }
}
