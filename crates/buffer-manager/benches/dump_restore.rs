// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for the dump/restore round-trip.

use buffer_manager::{BufferManager, HeapAlloc, ManagerConfig};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_dump_restore(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mgr = BufferManager::with_config(ManagerConfig {
        spill_dir: Some(dir.path().to_path_buf()),
        ..ManagerConfig::default()
    })
    .unwrap();

    let mut group = c.benchmark_group("dump_restore");
    for size in [64 << 10, 1 << 20, 16 << 20] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let id = mgr.register();
            mgr.allocate(id, size, HeapAlloc::shared()).wait().unwrap();
            b.iter(|| {
                assert!(mgr.dump(id).wait().unwrap());
                assert!(mgr.restore(id).wait().unwrap());
            });
            mgr.destroy(id).wait().unwrap();
            mgr.unregister(id).wait().unwrap();
        });
    }
    group.finish();
}

fn bench_lock_unlock(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mgr = BufferManager::with_config(ManagerConfig {
        spill_dir: Some(dir.path().to_path_buf()),
        ..ManagerConfig::default()
    })
    .unwrap();

    let id = mgr.register();
    mgr.allocate(id, 1 << 20, HeapAlloc::shared()).wait().unwrap();

    c.bench_function("lock_unlock_loaded", |b| {
        b.iter(|| {
            let lock = mgr.lock(id).wait().unwrap();
            criterion::black_box(lock.bytes()[0]);
        });
    });
}

criterion_group!(benches, bench_dump_restore, bench_lock_unlock);
criterion_main!(benches);
