// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # spill-store
//!
//! Temporary-file plumbing for buffers that have been evicted to disk.
//!
//! # Key Components
//!
//! - [`FileHolder`] — a cloneable handle to a spill-file path with an
//!   optional shared delete-on-last-drop guard. Cloning shares the guard;
//!   the file is deleted exactly once, when the last clone goes away.
//! - [`write_raw`] / [`read_raw`] — exact byte-count binary file I/O.
//!   A short transfer is an error, never a silent truncation.
//! - [`create_spill_file`] — allocates a uniquely named file in a spill
//!   directory and wraps it in an auto-deleting [`FileHolder`].
//!
//! # On-Disk Format
//!
//! There is none: a spill file is exactly the buffer's bytes, headerless.
//! Restoring is purely positional — the caller must know the byte count.
//!
//! # Example
//! ```
//! use spill_store::{create_spill_file, read_raw, write_raw};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let holder = create_spill_file(dir.path()).unwrap();
//!
//! write_raw(holder.path().unwrap(), b"payload").unwrap();
//! let mut buf = [0u8; 7];
//! read_raw(holder.path().unwrap(), &mut buf).unwrap();
//! assert_eq!(&buf, b"payload");
//!
//! let path = holder.path().unwrap().to_path_buf();
//! drop(holder);
//! assert!(!path.exists()); // last holder deleted the file
//! ```

mod error;
mod file_holder;
mod raw;

pub use error::SpillError;
pub use file_holder::FileHolder;
pub use raw::{create_spill_file, read_exact_from, read_raw, write_raw};
