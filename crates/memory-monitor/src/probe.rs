// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `/proc/meminfo` parsing.

use crate::MonitorError;
use std::path::Path;

const MEMINFO_PATH: &str = "/proc/meminfo";

/// A point-in-time view of system memory headroom.
///
/// `available_bytes` is the kernel's `MemAvailable` estimate: free pages
/// plus reclaimable buffers and cache. It is the figure eviction logic
/// should compare thresholds against.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct FreeMemory {
    /// Total physical memory in bytes (`MemTotal`).
    pub total_bytes: u64,
    /// Memory available for new allocations in bytes (`MemAvailable`).
    pub available_bytes: u64,
}

impl FreeMemory {
    /// Queries current memory state from `/proc/meminfo`.
    pub fn query() -> Result<Self, MonitorError> {
        Self::query_from(Path::new(MEMINFO_PATH))
    }

    /// Queries from a specific meminfo-formatted file (test seam).
    pub fn query_from(path: &Path) -> Result<Self, MonitorError> {
        let content = std::fs::read_to_string(path).map_err(|e| MonitorError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Memory in use, in bytes.
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, MonitorError> {
        let mut total = None;
        let mut available = None;

        for line in content.lines() {
            let field = match line.split_once(':') {
                Some(("MemTotal", rest)) => Some((&mut total, rest)),
                Some(("MemAvailable", rest)) => Some((&mut available, rest)),
                _ => None,
            };
            if let Some((slot, rest)) = field {
                let kb: u64 = rest
                    .trim()
                    .trim_end_matches("kB")
                    .trim()
                    .parse()
                    .map_err(|_| MonitorError::Parse {
                        path: path.display().to_string(),
                        detail: format!("expected integer kB value in line '{line}'"),
                    })?;
                *slot = Some(kb * 1024);
            }
            if total.is_some() && available.is_some() {
                break;
            }
        }

        match (total, available) {
            (Some(total_bytes), Some(available_bytes)) => Ok(Self {
                total_bytes,
                available_bytes,
            }),
            (None, _) => Err(MonitorError::Parse {
                path: path.display().to_string(),
                detail: "MemTotal not found".into(),
            }),
            (_, None) => Err(MonitorError::Parse {
                path: path.display().to_string(),
                detail: "MemAvailable not found".into(),
            }),
        }
    }
}
