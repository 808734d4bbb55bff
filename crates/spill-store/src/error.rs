// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for spill-file I/O.

use std::path::PathBuf;

/// Errors that can occur while creating, writing, or reading spill files.
#[derive(Debug, thiserror::Error)]
pub enum SpillError {
    /// The spill file could not be created.
    #[error("cannot create spill file in '{dir}': {source}")]
    Create {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The spill file could not be opened.
    #[error("cannot open spill file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A write transferred fewer bytes than requested.
    #[error("short write to '{path}': wrote {actual} of {expected} bytes")]
    ShortWrite {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// A read transferred fewer bytes than requested.
    #[error("short read from '{path}': got {actual} of {expected} bytes")]
    ShortRead {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// An underlying I/O operation failed mid-transfer.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The holder has no path (it was cleared).
    #[error("file holder is empty")]
    EmptyHolder,
}
