// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Exact byte-count raw file I/O.
//!
//! Spill files carry no header, no checksum, no framing — exactly the
//! buffer's bytes. These helpers therefore verify byte counts strictly:
//! a transfer that moves fewer bytes than requested is an error, never a
//! silently truncated success.

use crate::{FileHolder, SpillError};
use std::io::{Read, Write};
use std::path::Path;

/// Prefix for manager-created spill files.
const SPILL_PREFIX: &str = "spillway-";

/// Creates a uniquely named spill file in `dir` and returns an
/// auto-deleting [`FileHolder`] for it.
///
/// The file is created empty; callers follow up with [`write_raw`].
pub fn create_spill_file(dir: &Path) -> Result<FileHolder, SpillError> {
    let file = tempfile::Builder::new()
        .prefix(SPILL_PREFIX)
        .suffix(".dump")
        .tempfile_in(dir)
        .map_err(|e| SpillError::Create {
            dir: dir.to_path_buf(),
            source: e,
        })?;

    // Detach tempfile's own deletion; lifetime is owned by the holder.
    let (_, path) = file.keep().map_err(|e| SpillError::Create {
        dir: dir.to_path_buf(),
        source: e.error,
    })?;

    tracing::debug!("created spill file '{}'", path.display());
    Ok(FileHolder::auto_delete(path))
}

/// Writes exactly `data.len()` bytes to `path`, truncating any previous
/// content.
///
/// Returns [`SpillError::ShortWrite`] if the full byte count could not
/// be transferred.
pub fn write_raw(path: &Path, data: &[u8]) -> Result<(), SpillError> {
    let mut file = std::fs::File::create(path).map_err(|e| SpillError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;

    file.write_all(data).map_err(|e| SpillError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    file.flush().map_err(|e| SpillError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    // write_all either writes everything or errors, but the length on
    // disk is the contract restore depends on, so verify it.
    let written = file
        .metadata()
        .map_err(|e| SpillError::Io {
            path: path.to_path_buf(),
            source: e,
        })?
        .len() as usize;
    if written != data.len() {
        return Err(SpillError::ShortWrite {
            path: path.to_path_buf(),
            expected: data.len(),
            actual: written,
        });
    }

    Ok(())
}

/// Reads exactly `buf.len()` bytes from `path` into `buf`.
///
/// Returns [`SpillError::ShortRead`] if the file holds fewer bytes than
/// requested.
pub fn read_raw(path: &Path, buf: &mut [u8]) -> Result<(), SpillError> {
    let file = std::fs::File::open(path).map_err(|e| SpillError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;

    read_exact_from(file, buf, path)
}

/// Reads exactly `buf.len()` bytes from an already-open reader.
///
/// Shared by [`read_raw`] and stream-based restores; `path` is used only
/// for error reporting.
pub fn read_exact_from<R: Read>(
    mut reader: R,
    buf: &mut [u8],
    path: &Path,
) -> Result<(), SpillError> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break, // EOF
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(SpillError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }

    if total != buf.len() {
        return Err(SpillError::ShortRead {
            path: path.to_path_buf(),
            expected: buf.len(),
            actual: total,
        });
    }

    Ok(())
}
