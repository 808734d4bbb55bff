// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The watermark policy.
//!
//! [`BarrierDump`] tracks resident bytes with two running totals —
//! bytes allocated and bytes dumped — updated incrementally from the
//! hooks. `alive = allocated - dumped` is the resident figure; when it
//! crosses the configured barrier, candidates are dumped in registry
//! order until it is back under.
//!
//! The totals must never go negative; a decrement below zero means a
//! hook was missed or double-counted and trips a debug assertion.

use crate::policy::DumpPolicy;
use crate::registry::Registry;
use crate::{BufferId, ByteSize};

/// Default barrier: 512 MB resident.
const DEFAULT_BARRIER: u64 = 512 << 20;

/// Dumps buffers once resident bytes exceed a configurable barrier.
///
/// # Parameters
/// - `"barrier"` — byte-size string, e.g. `"500MB"`.
#[derive(Debug, Clone)]
pub struct BarrierDump {
    barrier: u64,
    /// Running total of bytes allocated across the registry.
    allocated: u64,
    /// Running total of bytes currently dumped.
    dumped: u64,
}

impl BarrierDump {
    pub fn new() -> Self {
        Self::with_barrier(ByteSize::from_bytes(DEFAULT_BARRIER))
    }

    pub fn with_barrier(barrier: ByteSize) -> Self {
        Self {
            barrier: barrier.as_bytes(),
            allocated: 0,
            dumped: 0,
        }
    }

    /// Resident bytes according to the running totals.
    pub fn alive_bytes(&self) -> u64 {
        self.allocated.saturating_sub(self.dumped)
    }

    fn charge(&mut self, size: usize) {
        self.allocated += size as u64;
    }

    fn discharge(&mut self, size: usize) {
        debug_assert!(
            self.allocated >= size as u64,
            "allocated byte total would go negative",
        );
        self.allocated = self.allocated.saturating_sub(size as u64);
    }

    /// Dumps candidates until `alive <= barrier` or none remain.
    fn enforce(&mut self, reg: &mut Registry) {
        if self.alive_bytes() <= self.barrier {
            return;
        }
        for (id, _) in reg.dump_candidates() {
            if self.alive_bytes() <= self.barrier {
                break;
            }
            // dump_success updates self.dumped as each dump lands.
            reg.dump_direct(self, id);
        }
        if self.alive_bytes() > self.barrier {
            tracing::debug!(
                "barrier policy could not get under {}: {} bytes alive, no more candidates",
                self.barrier,
                self.alive_bytes(),
            );
        }
    }
}

impl Default for BarrierDump {
    fn default() -> Self {
        Self::new()
    }
}

impl DumpPolicy for BarrierDump {
    fn name(&self) -> &'static str {
        "barrier"
    }

    /// Rebuilds the totals from the registry. Called when the policy is
    /// swapped in, so pre-existing buffers are accounted for.
    fn refresh(&mut self, reg: &mut Registry) {
        let stats = reg.stats();
        self.allocated = stats.total_managed as u64;
        self.dumped = stats.total_dumped as u64;
        self.enforce(reg);
    }

    fn allocation_request(&mut self, reg: &mut Registry, _id: BufferId, size: usize) {
        // Charge the upcoming allocation first, so large requests free
        // room before the memory is claimed.
        self.charge(size);
        self.enforce(reg);
    }

    fn set_request(&mut self, reg: &mut Registry, _id: BufferId, size: usize) {
        self.charge(size);
        self.enforce(reg);
    }

    fn reallocate_request(&mut self, reg: &mut Registry, id: BufferId, new_size: usize) {
        let old = reg.size_of(id).unwrap_or(0);
        if new_size >= old {
            self.charge(new_size - old);
        } else {
            self.discharge(old - new_size);
        }
        self.enforce(reg);
    }

    fn destroy_request(&mut self, reg: &mut Registry, id: BufferId) {
        let size = reg.size_of(id).unwrap_or(0);
        if reg.is_loaded(id) == Some(false) {
            debug_assert!(
                self.dumped >= size as u64,
                "dumped byte total would go negative",
            );
            self.dumped = self.dumped.saturating_sub(size as u64);
        }
        self.discharge(size);
    }

    fn lock_request(&mut self, reg: &mut Registry, _id: BufferId) {
        self.enforce(reg);
    }

    fn unlock_request(&mut self, reg: &mut Registry, _id: BufferId) {
        self.enforce(reg);
    }

    fn dump_success(&mut self, reg: &mut Registry, id: BufferId) {
        let size = reg.size_of(id).unwrap_or(0);
        self.dumped += size as u64;
        debug_assert!(
            self.dumped <= self.allocated,
            "dumped byte total exceeds allocated total",
        );
    }

    fn restore_success(&mut self, reg: &mut Registry, id: BufferId) {
        let size = reg.size_of(id).unwrap_or(0);
        debug_assert!(
            self.dumped >= size as u64,
            "dumped byte total would go negative",
        );
        self.dumped = self.dumped.saturating_sub(size as u64);
    }

    fn set_param(&mut self, name: &str, value: &str) -> bool {
        match name {
            "barrier" => match ByteSize::parse(value) {
                Ok(size) => {
                    self.barrier = size.as_bytes();
                    true
                }
                Err(e) => {
                    tracing::error!("barrier policy: invalid value '{value}': {e}");
                    false
                }
            },
            other => {
                tracing::error!("barrier policy: unknown parameter '{other}'");
                false
            }
        }
    }

    fn get_param(&self, name: &str) -> Option<String> {
        match name {
            "barrier" => Some(ByteSize::from_bytes(self.barrier).to_string()),
            _ => None,
        }
    }

    fn param_names(&self) -> &[&'static str] {
        &["barrier"]
    }
}
