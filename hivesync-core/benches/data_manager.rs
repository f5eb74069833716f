//! DataManager throughput against the in-process overlay

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use hivesync_core::core_data::{ProtectionKeys, VersionedEntry};
use hivesync_core::core_dht::{ContentAddress, Target};
use hivesync_core::test_utils::{deterministic_bytes_with_seed, test_key_pair, unique_address, TestNetwork};

fn runtime() -> Runtime {
    Runtime::new().expect("tokio runtime")
}

/// Slot holding a chain of `versions` revisions
fn seeded(rt: &Runtime, network: &TestNetwork, versions: usize) -> ContentAddress {
    let address = unique_address();
    rt.block_on(async {
        for i in 0..versions {
            network.seed_entry(address, &deterministic_bytes_with_seed(256, i as u64)).await;
        }
    });
    address
}

fn bench_put(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("data_put");

    for size in [64usize, 1024, 16 * 1024].iter() {
        let network = TestNetwork::new();
        let payload = deterministic_bytes_with_seed(*size, 42);
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("payload_bytes", size), size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let mut entry = VersionedEntry::new(payload.clone());
                let key = network
                    .data()
                    .put(unique_address(), &mut entry, &ProtectionKeys::unprotected())
                    .await
                    .unwrap();
                black_box(key)
            });
        });
    }

    let network = TestNetwork::new();
    let pair = test_key_pair(1);
    group.bench_function("protected_fresh", |b| {
        b.to_async(&rt).iter(|| async {
            let mut entry = VersionedEntry::new(vec![0u8; 256]);
            let keys = ProtectionKeys::fresh(pair.clone());
            black_box(network.data().put(unique_address(), &mut entry, &keys).await.unwrap())
        });
    });

    group.finish();
}

fn bench_chained_put(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("data_chained_put");

    // chain validation walks every stored link of the slot
    for depth in [1usize, 16, 128].iter() {
        let network = TestNetwork::new();
        let address = seeded(&rt, &network, *depth);
        let head = rt
            .block_on(network.data().get_latest(address))
            .unwrap()
            .unwrap();
        group.bench_with_input(BenchmarkId::new("chain_depth", depth), depth, |b, _| {
            b.to_async(&rt).iter(|| async {
                let mut entry = head.entry.successor(vec![1u8; 64]);
                black_box(
                    network
                        .data()
                        .put(address, &mut entry, &ProtectionKeys::unprotected())
                        .await
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

fn bench_reads(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("data_reads");

    for versions in [1usize, 32, 256].iter() {
        let network = TestNetwork::new();
        let address = seeded(&rt, &network, *versions);
        group.throughput(Throughput::Elements(*versions as u64));

        group.bench_with_input(BenchmarkId::new("get_latest", versions), versions, |b, _| {
            b.to_async(&rt).iter(|| async { black_box(network.data().get_latest(address).await.unwrap()) });
        });
        group.bench_with_input(BenchmarkId::new("digest", versions), versions, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(network.data().digest(Target::all(address)).await.unwrap()) });
        });
        group.bench_with_input(BenchmarkId::new("heads", versions), versions, |b, _| {
            b.to_async(&rt).iter(|| async { black_box(network.data().heads(address).await.unwrap()) });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_put, bench_chained_put, bench_reads);
criterion_main!(benches);
