use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use memsync_core::{ChangeOrigin, Delta, DeltaEntry, ReplicaId, Store, VersionStamp};

fn delta(replica: ReplicaId, size: u64, counter_base: u64) -> Delta {
    (0..size)
        .map(|i| DeltaEntry {
            key: Bytes::from(format!("key:{}", i)),
            payload: Bytes::from(format!("value_{}", i)),
            stamp: Some(VersionStamp::new(replica, counter_base + i + 1)),
            tombstone: false,
            ..DeltaEntry::default()
        })
        .collect()
}

fn bench_apply_fresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_apply_fresh");
    let remote = ReplicaId::from_u128(7);

    for size in [10u64, 100, 1_000].iter() {
        let incoming = delta(remote, *size, 0);
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::new("entries", size), &incoming, |b, incoming| {
            b.iter_batched(
                Store::new,
                |store| black_box(store.apply_delta(incoming, ChangeOrigin::Remote)),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_apply_conflicting(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_apply_conflicting");
    let local = ReplicaId::from_u128(1);
    let remote = ReplicaId::from_u128(2);

    for size in [100u64, 1_000].iter() {
        let seed = delta(local, *size, 0);
        let incoming = delta(remote, *size, *size / 2);
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::new("entries", size), &incoming, |b, incoming| {
            b.iter_batched(
                || {
                    let store = Store::new();
                    store.apply_delta(&seed, ChangeOrigin::Remote);
                    store
                },
                |store| black_box(store.apply_delta(incoming, ChangeOrigin::Remote)),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_outgoing_delta(c: &mut Criterion) {
    let store = Store::new();
    store.apply_delta(&delta(ReplicaId::from_u128(3), 10_000, 0), ChangeOrigin::Remote);

    c.bench_function("full_delta_10k", |b| b.iter(|| black_box(store.full_delta())));
}

criterion_group!(benches, bench_apply_fresh, bench_apply_conflicting, bench_outgoing_delta);
criterion_main!(benches);
