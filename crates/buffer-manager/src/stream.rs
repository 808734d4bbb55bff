// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Stream factories: fresh readers over a buffer's current backing.
//!
//! A factory is asked for a new reader every time one is needed — at
//! restore, and for [`StreamInfo`] snapshots — and never cached across
//! mutations, because the backing changes whenever a buffer is dumped,
//! restored, or reallocated.
//!
//! Built-in factories:
//! - [`MemoryStreamFactory`] — reads straight out of the shared data
//!   cell of a loaded buffer.
//! - [`FileStreamFactory`] — opens the backing spill file; the reader
//!   keeps a [`FileHolder`] clone so the file outlives it.
//!
//! Closures also work: any `Fn() -> Result<Box<dyn Read + Send>, _>`
//! is a factory, which is how callers plug in archive entries or other
//! exotic backings without a dedicated type.

use crate::record::DataCell;
use crate::{BufferError, BufferId, BufferLock, FileFormat};
use spill_store::{FileHolder, SpillError};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

/// Produces a fresh readable stream over a buffer's current backing.
pub trait StreamFactory: Send + Sync {
    /// Opens a new reader positioned at the start of the content.
    fn open(&self) -> Result<Box<dyn Read + Send>, BufferError>;
}

impl<F> StreamFactory for F
where
    F: Fn() -> Result<Box<dyn Read + Send>, BufferError> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn Read + Send>, BufferError> {
        self()
    }
}

// ── In-memory streaming ────────────────────────────────────────

/// Streams the contents of a loaded buffer's data cell.
pub struct MemoryStreamFactory {
    data: DataCell,
}

impl MemoryStreamFactory {
    pub(crate) fn new(data: DataCell) -> Self {
        Self { data }
    }
}

impl StreamFactory for MemoryStreamFactory {
    fn open(&self) -> Result<Box<dyn Read + Send>, BufferError> {
        Ok(Box::new(MemoryReader {
            data: Arc::clone(&self.data),
            pos: 0,
        }))
    }
}

/// Reader over the shared data cell. Takes a short read lock per `read`
/// call rather than holding one across the reader's lifetime.
struct MemoryReader {
    data: DataCell,
    pos: usize,
}

impl Read for MemoryReader {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let slot = self.data.read();
        let Some(bytes) = slot.as_deref() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "source buffer is no longer resident",
            ));
        };
        let n = out.len().min(bytes.len().saturating_sub(self.pos));
        out[..n].copy_from_slice(&bytes[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

// ── File streaming ─────────────────────────────────────────────

/// Opens the backing spill file for binary read.
pub struct FileStreamFactory {
    holder: FileHolder,
}

impl FileStreamFactory {
    pub fn new(holder: FileHolder) -> Self {
        Self { holder }
    }
}

impl StreamFactory for FileStreamFactory {
    fn open(&self) -> Result<Box<dyn Read + Send>, BufferError> {
        let path = self.holder.path().ok_or(SpillError::EmptyHolder)?;
        let file = std::fs::File::open(path).map_err(|e| SpillError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Box::new(FileReader {
            file,
            _holder: self.holder.clone(),
        }))
    }
}

/// File reader pinning the spill file through a holder clone.
struct FileReader {
    file: std::fs::File,
    _holder: FileHolder,
}

impl Read for FileReader {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(out)
    }
}

// ── Snapshots ──────────────────────────────────────────────────

/// Read-only view of a buffer's backing plus a freshly opened reader.
///
/// Lets writers stream a buffer's bytes without loading it — a dumped
/// buffer is copied straight off its spill file. For a loaded buffer the
/// snapshot carries a lock token, so the source cannot be evicted while
/// the reader is alive; dropping the snapshot releases it.
pub struct StreamInfo {
    /// The buffer this snapshot describes.
    pub id: BufferId,
    /// Logical byte length of the content.
    pub size: usize,
    /// Interpretation of the backing file.
    pub format: FileFormat,
    /// True when the stream factory was caller-supplied.
    pub user_stream: bool,
    /// Path of the backing file, when the buffer is file-backed.
    pub backing_path: Option<PathBuf>,
    /// Fresh reader over the content.
    pub reader: Box<dyn Read + Send>,
    /// Residency pin for in-memory sources.
    pub(crate) _pin: Option<BufferLock>,
}

impl std::fmt::Debug for StreamInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamInfo")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("format", &self.format)
            .field("user_stream", &self.user_stream)
            .field("backing_path", &self.backing_path)
            .field("pinned", &self._pin.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;

    fn cell(bytes: Vec<u8>) -> DataCell {
        Arc::new(RwLock::new(Some(bytes)))
    }

    #[test]
    fn test_memory_stream_reads_all() {
        let factory = MemoryStreamFactory::new(cell(vec![1, 2, 3, 4, 5]));
        let mut reader = factory.open().unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_memory_stream_fresh_per_open() {
        let factory = MemoryStreamFactory::new(cell(vec![9; 8]));
        let mut a = factory.open().unwrap();
        let mut out = [0u8; 8];
        a.read_exact(&mut out).unwrap();

        // A second reader starts over at position zero.
        let mut b = factory.open().unwrap();
        let mut out2 = [0u8; 8];
        b.read_exact(&mut out2).unwrap();
        assert_eq!(out, out2);
    }

    #[test]
    fn test_memory_stream_fails_after_eviction() {
        let data = cell(vec![1, 2, 3]);
        let factory = MemoryStreamFactory::new(Arc::clone(&data));
        let mut reader = factory.open().unwrap();

        *data.write() = None; // storage taken away mid-stream
        let mut out = [0u8; 3];
        assert!(reader.read(&mut out).is_err());
    }

    #[test]
    fn test_file_stream_reads_backing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backing.dump");
        std::fs::write(&path, b"on-disk bytes").unwrap();

        let factory = FileStreamFactory::new(FileHolder::plain(path));
        let mut reader = factory.open().unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "on-disk bytes");
    }

    #[test]
    fn test_file_stream_keeps_file_alive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pinned.dump");
        std::fs::write(&path, b"pinned").unwrap();

        let holder = FileHolder::auto_delete(path.clone());
        let factory = FileStreamFactory::new(holder.clone());
        let mut reader = factory.open().unwrap();
        drop(factory);
        drop(holder); // reader's clone still pins the file

        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "pinned");
        drop(reader);
        assert!(!path.exists());
    }

    #[test]
    fn test_empty_holder_open_fails() {
        let factory = FileStreamFactory::new(FileHolder::empty());
        assert!(factory.open().is_err());
    }

    #[test]
    fn test_closure_factory() {
        let factory = || -> Result<Box<dyn Read + Send>, BufferError> {
            Ok(Box::new(&b"closure bytes"[..]))
        };
        let mut reader = StreamFactory::open(&factory).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "closure bytes");
    }
}
