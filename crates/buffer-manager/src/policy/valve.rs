// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The system-memory valve policy.
//!
//! Where [`BarrierDump`](crate::BarrierDump) budgets the bytes *this*
//! registry holds, [`ValveDump`] watches what the operating system
//! actually has left. On every pressure-increasing event it queries free
//! memory; at or below `min_free_mem` (plus the size of the imminent
//! request) it dumps buffers until free memory clears
//! `min_free_mem + hysteresis_offset` — the hysteresis gap keeps the
//! valve from oscillating around the threshold.
//!
//! The policy is generic over its [`MemoryProbe`], so tests substitute a
//! mock while production uses `/proc/meminfo`.

use crate::policy::DumpPolicy;
use crate::registry::Registry;
use crate::{BufferId, ByteSize};
use memory_monitor::FreeMemory;

/// Default free-memory floor: 256 MB.
const DEFAULT_MIN_FREE: u64 = 256 << 20;
/// Default hysteresis gap: 64 MB above the floor.
const DEFAULT_HYSTERESIS: u64 = 64 << 20;

/// Capability to query the system's available memory.
pub trait MemoryProbe: Send {
    /// Free bytes as the OS sees them, or `None` when unavailable.
    fn available_bytes(&self) -> Option<u64>;
}

/// The production probe: reads `/proc/meminfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl MemoryProbe for SystemProbe {
    fn available_bytes(&self) -> Option<u64> {
        match FreeMemory::query() {
            Ok(mem) => Some(mem.available_bytes),
            Err(e) => {
                tracing::warn!("valve policy: free-memory query failed: {e}");
                None
            }
        }
    }
}

/// Dumps buffers when actual system free memory runs low.
///
/// # Parameters
/// - `"min_free_mem"` — byte-size string; eviction starts at or below
///   this much free memory.
/// - `"hysteresis_offset"` — byte-size string; eviction stops once free
///   memory exceeds `min_free_mem + hysteresis_offset`.
pub struct ValveDump<P: MemoryProbe> {
    probe: P,
    min_free: u64,
    hysteresis: u64,
}

impl ValveDump<SystemProbe> {
    /// Valve over the real system memory probe.
    pub fn system() -> Self {
        Self::new(SystemProbe)
    }
}

impl<P: MemoryProbe + 'static> ValveDump<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            min_free: DEFAULT_MIN_FREE,
            hysteresis: DEFAULT_HYSTERESIS,
        }
    }

    pub fn with_thresholds(probe: P, min_free: ByteSize, hysteresis: ByteSize) -> Self {
        Self {
            probe,
            min_free: min_free.as_bytes(),
            hysteresis: hysteresis.as_bytes(),
        }
    }

    /// Checks the valve and dumps until free memory clears the target.
    ///
    /// `supplement` is the size of the imminent request, so an
    /// allocation that would itself breach the floor triggers eviction
    /// before the memory is claimed.
    fn relieve(&mut self, reg: &mut Registry, supplement: u64) {
        let Some(free) = self.probe.available_bytes() else {
            return;
        };
        if free > self.min_free.saturating_add(supplement) {
            return;
        }

        let target = self.min_free.saturating_add(self.hysteresis);
        tracing::info!(
            "valve open: {free} bytes free <= floor {} (+{supplement} requested), \
             dumping until {target}",
            self.min_free,
        );

        for (id, _) in reg.dump_candidates() {
            match self.probe.available_bytes() {
                Some(free) if free > target => return,
                Some(_) => {}
                None => return,
            }
            reg.dump_direct(self, id);
        }
    }
}

impl<P: MemoryProbe + 'static> DumpPolicy for ValveDump<P> {
    fn name(&self) -> &'static str {
        "valve"
    }

    fn refresh(&mut self, reg: &mut Registry) {
        self.relieve(reg, 0);
    }

    fn allocation_request(&mut self, reg: &mut Registry, _id: BufferId, size: usize) {
        self.relieve(reg, size as u64);
    }

    fn set_request(&mut self, reg: &mut Registry, _id: BufferId, size: usize) {
        self.relieve(reg, size as u64);
    }

    fn reallocate_request(&mut self, reg: &mut Registry, id: BufferId, new_size: usize) {
        let old = reg.size_of(id).unwrap_or(0);
        self.relieve(reg, new_size.saturating_sub(old) as u64);
    }

    fn lock_request(&mut self, reg: &mut Registry, id: BufferId) {
        // Locking a dumped buffer is about to restore it.
        let supplement = match reg.is_loaded(id) {
            Some(false) => reg.size_of(id).unwrap_or(0) as u64,
            _ => 0,
        };
        self.relieve(reg, supplement);
    }

    fn set_param(&mut self, name: &str, value: &str) -> bool {
        let slot = match name {
            "min_free_mem" => &mut self.min_free,
            "hysteresis_offset" => &mut self.hysteresis,
            other => {
                tracing::error!("valve policy: unknown parameter '{other}'");
                return false;
            }
        };
        match ByteSize::parse(value) {
            Ok(size) => {
                *slot = size.as_bytes();
                true
            }
            Err(e) => {
                tracing::error!("valve policy: invalid value '{value}' for '{name}': {e}");
                false
            }
        }
    }

    fn get_param(&self, name: &str) -> Option<String> {
        match name {
            "min_free_mem" => Some(ByteSize::from_bytes(self.min_free).to_string()),
            "hysteresis_offset" => Some(ByteSize::from_bytes(self.hysteresis).to_string()),
            _ => None,
        }
    }

    fn param_names(&self) -> &[&'static str] {
        &["min_free_mem", "hysteresis_offset"]
    }
}

impl<P: MemoryProbe> std::fmt::Debug for ValveDump<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValveDump")
            .field("min_free", &self.min_free)
            .field("hysteresis", &self.hysteresis)
            .finish()
    }
}
