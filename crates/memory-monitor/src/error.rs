// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for system memory queries.

/// Errors that can occur when querying system memory state.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The procfs file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// A required field was missing or malformed.
    #[error("failed to parse {path}: {detail}")]
    Parse { path: String, detail: String },
}
