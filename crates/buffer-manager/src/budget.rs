// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Human-readable byte sizes.
//!
//! Policy thresholds ("barrier", "min_free_mem") and configuration values
//! are byte counts, but humans write them as `"512M"` or `"2G"`.
//! [`ByteSize`] parses that grammar and formats counts back so that
//! `parse(format(x)) == x` — the round-trip property policy parameter
//! get/set relies on.

use crate::BufferError;
use std::fmt;

/// Suffix table: (suffix, multiplier). Longest match wins.
const SUFFIXES: &[(&str, u64)] = &[
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
    ("G", 1 << 30),
    ("M", 1 << 20),
    ("K", 1 << 10),
    ("B", 1),
];

/// A byte count with human-readable parsing and formatting.
///
/// # Grammar
/// A decimal integer followed by an optional, case-insensitive suffix:
/// `K`/`KB`, `M`/`MB`, `G`/`GB`, `B`, or nothing (raw bytes).
/// Surrounding whitespace is ignored.
///
/// # Examples
/// ```
/// use buffer_manager::ByteSize;
///
/// assert_eq!(ByteSize::parse("512M").unwrap().as_bytes(), 512 << 20);
/// assert_eq!(ByteSize::parse("1gb").unwrap().as_bytes(), 1 << 30);
/// assert_eq!(ByteSize::parse("4096").unwrap().as_bytes(), 4096);
///
/// let s = ByteSize::from_bytes(500 << 20);
/// assert_eq!(ByteSize::parse(&s.to_string()).unwrap(), s);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct ByteSize {
    bytes: u64,
}

impl ByteSize {
    /// Creates a size from a raw byte count.
    pub fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    /// Creates a size from mebibytes.
    pub fn from_mb(mb: u64) -> Self {
        Self { bytes: mb << 20 }
    }

    /// Creates a size from gibibytes.
    pub fn from_gb(gb: u64) -> Self {
        Self { bytes: gb << 30 }
    }

    /// Returns the size in bytes.
    pub fn as_bytes(&self) -> u64 {
        self.bytes
    }

    /// Parses a human-readable byte-size string.
    pub fn parse(s: &str) -> Result<Self, BufferError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(BufferError::Config(format!(
                "empty byte-size string '{s}'"
            )));
        }

        let upper = trimmed.to_uppercase();
        let (digits, multiplier) = SUFFIXES
            .iter()
            .find_map(|&(suffix, mult)| {
                upper
                    .strip_suffix(suffix)
                    .map(|rest| (rest.trim_end(), mult))
            })
            .unwrap_or((upper.as_str(), 1));

        let value: u64 = digits.trim().parse().map_err(|_| {
            BufferError::Config(format!(
                "invalid byte size '{s}': expected a number with an optional K/M/G suffix"
            ))
        })?;

        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| BufferError::Config(format!("byte size overflow in '{s}'")))?;

        Ok(Self { bytes })
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &(suffix, mult) in &[("GB", 1u64 << 30), ("MB", 1 << 20), ("KB", 1 << 10)] {
            if self.bytes >= mult && self.bytes % mult == 0 {
                return write!(f, "{}{}", self.bytes / mult, suffix);
            }
        }
        write!(f, "{}B", self.bytes)
    }
}
