// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: the full buffer lifecycle end-to-end.
//!
//! These exercise the complete flow — register → allocate → dump →
//! restore → destroy → unregister — through the public queued API,
//! with eviction policies, lock tokens, custom stream factories, and
//! concurrent callers in the mix.

use buffer_manager::{
    BufferError, BufferManager, ByteSize, HeapAlloc, LoadingMode, ManagerConfig, MemoryProbe,
    FileFormat, StreamFactory, ValveDump,
};
use spill_store::FileHolder;
use std::io::Read;
use std::sync::Arc;

// ── Helpers ────────────────────────────────────────────────────

fn manager_in(dir: &std::path::Path) -> BufferManager {
    BufferManager::with_config(ManagerConfig {
        spill_dir: Some(dir.to_path_buf()),
        ..ManagerConfig::default()
    })
    .unwrap()
}

/// Deterministic non-trivial payload.
fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ── Dump / restore round-trips ─────────────────────────────────

#[test]
fn test_dump_restore_roundtrip_preserves_content() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());

    let id = mgr.register();
    let content = payload(64 * 1024);
    mgr.set(id, content.clone(), HeapAlloc::shared())
        .wait()
        .unwrap();

    assert!(mgr.dump(id).wait().unwrap());
    let infos = mgr.get_buffer_infos().wait().unwrap();
    assert!(!infos[0].loaded);
    let spill = infos[0].backing_path.clone().unwrap();
    assert_eq!(
        std::fs::metadata(&spill).unwrap().len() as usize,
        content.len(),
        "spill file is exactly the buffer's bytes"
    );

    assert!(mgr.restore(id).wait().unwrap());
    let lock = mgr.lock(id).wait().unwrap();
    assert_eq!(&lock.bytes()[..], &content[..]);
    assert!(!spill.exists(), "backing file released after restore");
}

#[test]
fn test_restore_is_idempotent_on_loaded_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());

    let id = mgr.register();
    mgr.allocate(id, 1024, HeapAlloc::shared()).wait().unwrap();
    assert!(mgr.restore(id).wait().unwrap());
    assert!(mgr.restore(id).wait().unwrap());
    assert!(mgr.get_buffer_infos().wait().unwrap()[0].loaded);
}

#[test]
fn test_dump_refuses_zero_size_and_unloaded() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());

    let id = mgr.register();
    // Fresh record: zero size.
    assert!(!mgr.dump(id).wait().unwrap());

    mgr.allocate(id, 256, HeapAlloc::shared()).wait().unwrap();
    assert!(mgr.dump(id).wait().unwrap());
    // Already dumped.
    assert!(!mgr.dump(id).wait().unwrap());
}

// ── Lock semantics ─────────────────────────────────────────────

#[test]
fn test_lock_excludes_dump() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());

    let id = mgr.register();
    mgr.allocate(id, 4096, HeapAlloc::shared()).wait().unwrap();

    let lock = mgr.lock(id).wait().unwrap();
    assert!(!mgr.dump(id).wait().unwrap(), "locked buffer must not dump");
    assert!(mgr.get_buffer_infos().wait().unwrap()[0].loaded);

    // A clone is another holder; releasing one is not enough.
    let second = lock.clone();
    drop(lock);
    assert!(!mgr.dump(id).wait().unwrap());

    drop(second);
    assert!(mgr.dump(id).wait().unwrap());
}

#[test]
fn test_restore_on_lock() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());

    let id = mgr.register();
    let content = payload(2048);
    mgr.set(id, content.clone(), HeapAlloc::shared())
        .wait()
        .unwrap();
    assert!(mgr.dump(id).wait().unwrap());

    // Lock on a dumped buffer restores before the token is returned.
    let lock = mgr.lock(id).wait().unwrap();
    assert!(mgr.get_buffer_infos().wait().unwrap()[0].loaded);
    assert_eq!(&lock.bytes()[..], &content[..]);
}

#[test]
fn test_lock_count_reflects_holders() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());

    let id = mgr.register();
    mgr.allocate(id, 64, HeapAlloc::shared()).wait().unwrap();

    let a = mgr.lock(id).wait().unwrap();
    let b = mgr.lock(id).wait().unwrap();
    let c = a.clone();
    assert_eq!(mgr.get_buffer_infos().wait().unwrap()[0].lock_count, 3);

    drop(a);
    drop(b);
    assert_eq!(mgr.get_buffer_infos().wait().unwrap()[0].lock_count, 1);
    drop(c);
    assert_eq!(mgr.get_buffer_infos().wait().unwrap()[0].lock_count, 0);
}

// ── Swap ───────────────────────────────────────────────────────

#[test]
fn test_swap_symmetry() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());

    let a = mgr.register();
    let b = mgr.register();
    mgr.set(a, payload(100), HeapAlloc::shared()).wait().unwrap();
    mgr.set(b, payload(200), HeapAlloc::shared()).wait().unwrap();
    assert!(mgr.dump(b).wait().unwrap());

    let before: Vec<(usize, bool)> = mgr
        .get_buffer_infos()
        .wait()
        .unwrap()
        .iter()
        .map(|i| (i.size, i.loaded))
        .collect();

    mgr.swap(a, b).wait().unwrap();
    let mid: Vec<(usize, bool)> = mgr
        .get_buffer_infos()
        .wait()
        .unwrap()
        .iter()
        .map(|i| (i.size, i.loaded))
        .collect();
    assert_eq!(mid, vec![(200, false), (100, true)]);

    mgr.swap(a, b).wait().unwrap();
    let after: Vec<(usize, bool)> = mgr
        .get_buffer_infos()
        .wait()
        .unwrap()
        .iter()
        .map(|i| (i.size, i.loaded))
        .collect();
    assert_eq!(after, before, "double swap restores the original state");

    // The swapped-back dumped buffer still restores correctly.
    assert!(mgr.restore(b).wait().unwrap());
    let lock = mgr.lock(b).wait().unwrap();
    assert_eq!(&lock.bytes()[..], &payload(200)[..]);
}

// ── Policies ───────────────────────────────────────────────────

#[test]
fn test_always_policy_evicts_on_every_step() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());
    mgr.set_policy_name("always").wait().unwrap();

    let a = mgr.register();
    mgr.allocate(a, 1024, HeapAlloc::shared()).wait().unwrap();
    assert!(mgr.get_buffer_infos().wait().unwrap()[0].loaded);

    // The next mutating event sweeps `a` out.
    let b = mgr.register();
    mgr.allocate(b, 1024, HeapAlloc::shared()).wait().unwrap();

    let infos = mgr.get_buffer_infos().wait().unwrap();
    assert!(!infos[0].loaded, "first buffer swept by the next event");
    assert!(infos[1].loaded, "the buffer just allocated stays loaded");
}

#[test]
fn test_barrier_policy_convergence() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());
    mgr.set_policy_name("barrier").wait().unwrap();
    assert!(mgr.set_policy_param("barrier", "250KB").wait().unwrap());

    let barrier = ByteSize::from_bytes(250 << 10).as_bytes() as usize;
    for _ in 0..8 {
        let id = mgr.register();
        mgr.allocate(id, 100 << 10, HeapAlloc::shared())
            .wait()
            .unwrap();
        let stats = mgr.get_buffer_stats().wait().unwrap();
        assert!(
            stats.total_resident() <= barrier,
            "resident {} bytes exceeds barrier {barrier}",
            stats.total_resident(),
        );
    }

    let stats = mgr.get_buffer_stats().wait().unwrap();
    assert_eq!(stats.total_managed, 8 * (100 << 10));
}

#[test]
fn test_barrier_param_roundtrip_through_manager() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());
    mgr.set_policy_name("barrier").wait().unwrap();

    assert!(mgr.set_policy_param("barrier", "500MB").wait().unwrap());
    let text = mgr.get_policy_param("barrier").wait().unwrap().unwrap();
    assert_eq!(
        ByteSize::parse(&text).unwrap().as_bytes(),
        500u64 << 20,
        "formatted parameter re-parses to the same byte count"
    );
}

#[test]
fn test_valve_policy_dumps_under_simulated_pressure() {
    struct LowMemory;
    impl MemoryProbe for LowMemory {
        fn available_bytes(&self) -> Option<u64> {
            Some(50 << 20) // 50 MB free, below the 100 MB floor
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());
    mgr.set_policy(Box::new(ValveDump::with_thresholds(
        LowMemory,
        ByteSize::from_mb(100),
        ByteSize::from_mb(10),
    )))
    .wait()
    .unwrap();

    let a = mgr.register();
    mgr.allocate(a, 8192, HeapAlloc::shared()).wait().unwrap();

    // Any allocation request under pressure must evict `a` first.
    let b = mgr.register();
    mgr.allocate(b, 8192, HeapAlloc::shared()).wait().unwrap();

    let infos = mgr.get_buffer_infos().wait().unwrap();
    assert!(!infos[0].loaded, "valve evicted the eligible buffer");
}

// ── Custom stream factories ────────────────────────────────────

fn archive_factory(bytes: Vec<u8>) -> Arc<dyn StreamFactory> {
    Arc::new(move || -> Result<Box<dyn Read + Send>, BufferError> {
        Ok(Box::new(std::io::Cursor::new(bytes.clone())))
    })
}

#[test]
fn test_user_stream_lazy_loading() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path()); // default loading mode: lazy

    let id = mgr.register();
    let content = payload(4096);
    mgr.set_stream_factory(
        id,
        archive_factory(content.clone()),
        content.len(),
        FileHolder::empty(),
        FileFormat::Raw,
        HeapAlloc::shared(),
    )
    .wait()
    .unwrap();

    // Lazy: still dumped, flagged as user-streamed.
    let info = &mgr.get_buffer_infos().wait().unwrap()[0];
    assert!(!info.loaded);
    assert!(info.user_stream);

    // First lock materializes through the custom factory.
    let lock = mgr.lock(id).wait().unwrap();
    assert_eq!(&lock.bytes()[..], &content[..]);
    assert!(mgr.get_buffer_infos().wait().unwrap()[0].loaded);
}

#[test]
fn test_user_stream_direct_loading() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());
    mgr.set_loading_mode(LoadingMode::Direct).wait().unwrap();

    let id = mgr.register();
    let content = payload(1024);
    mgr.set_stream_factory(
        id,
        archive_factory(content.clone()),
        content.len(),
        FileHolder::empty(),
        FileFormat::Raw,
        HeapAlloc::shared(),
    )
    .wait()
    .unwrap();

    // Direct: materialized before the call completed.
    let info = &mgr.get_buffer_infos().wait().unwrap()[0];
    assert!(info.loaded);
    assert!(!info.user_stream, "restore installs the in-memory factory");
}

#[test]
fn test_stream_info_after_set_is_not_user_stream() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());

    let id = mgr.register();
    mgr.set(id, payload(2048), HeapAlloc::shared()).wait().unwrap();

    let info = mgr.get_stream_info(id).wait().unwrap();
    assert_eq!(info.size, 2048);
    assert!(!info.user_stream);
}

#[test]
fn test_stream_info_streams_dumped_buffer_without_loading() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());

    let id = mgr.register();
    let content = payload(8192);
    mgr.set(id, content.clone(), HeapAlloc::shared())
        .wait()
        .unwrap();
    assert!(mgr.dump(id).wait().unwrap());

    let mut info = mgr.get_stream_info(id).wait().unwrap();
    assert!(info.backing_path.is_some());

    let mut streamed = Vec::new();
    info.reader.read_to_end(&mut streamed).unwrap();
    assert_eq!(streamed, content);

    // Copying off the spill file must not have loaded the buffer.
    assert!(!mgr.get_buffer_infos().wait().unwrap()[0].loaded);
}

#[test]
fn test_stream_info_pins_loaded_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());

    let id = mgr.register();
    mgr.set(id, payload(512), HeapAlloc::shared()).wait().unwrap();

    let info = mgr.get_stream_info(id).wait().unwrap();
    assert!(!mgr.dump(id).wait().unwrap(), "pinned while snapshot alive");

    drop(info);
    assert!(mgr.dump(id).wait().unwrap());
}

// ── Stats ──────────────────────────────────────────────────────

#[test]
fn test_stats_consistency() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager_in(dir.path());

    let sizes = [1024usize, 2048, 4096];
    let ids: Vec<_> = sizes
        .iter()
        .map(|&size| {
            let id = mgr.register();
            mgr.allocate(id, size, HeapAlloc::shared()).wait().unwrap();
            id
        })
        .collect();

    assert!(mgr.dump(ids[1]).wait().unwrap());

    let stats = mgr.get_buffer_stats().wait().unwrap();
    assert_eq!(stats.total_managed, sizes.iter().sum::<usize>());
    assert_eq!(stats.total_dumped, 2048);
    assert!(stats.total_dumped <= stats.total_managed);
}

// ── Concurrency ────────────────────────────────────────────────

#[test]
fn test_concurrent_callers_serialize_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = Arc::new(manager_in(dir.path()));

    let threads: Vec<_> = (0..4usize)
        .map(|t| {
            let mgr = Arc::clone(&mgr);
            std::thread::spawn(move || {
                for round in 0..10usize {
                    let id = mgr.register();
                    let size = 1024 * (t + 1) + round;
                    mgr.allocate(id, size, HeapAlloc::shared()).wait().unwrap();

                    {
                        let lock = mgr.lock(id).wait().unwrap();
                        lock.bytes_mut().fill(t as u8);
                    }
                    assert!(mgr.dump(id).wait().unwrap());
                    let lock = mgr.lock(id).wait().unwrap();
                    assert!(lock.bytes().iter().all(|&b| b == t as u8));
                    drop(lock);

                    mgr.destroy(id).wait().unwrap();
                    mgr.unregister(id).wait().unwrap();
                }
            })
        })
        .collect();

    for thread in threads {
        thread.join().unwrap();
    }

    let stats = mgr.get_buffer_stats().wait().unwrap();
    assert_eq!(stats.total_managed, 0);
    assert!(mgr.get_buffer_infos().wait().unwrap().is_empty());
}
