//! Benchmark for the allocation hot paths
//!
//! Status observation, the three-stage handshake, and idempotent
//! re-resolution of an existing grant.

use bus_node_allocator::protocol::{AllocationFragment, NodeAddress, NodeStatus, UniqueId};
use bus_node_allocator::{AddressAllocator, AllocationSession, NodeRegistry};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn bench_observe_status(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_registry");
    group.throughput(Throughput::Elements(1));

    let registry = NodeRegistry::new();

    group.bench_function("observe_status", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            counter += 1;
            let address = NodeAddress::new((counter % 126 + 1) as u8).unwrap();
            let status = NodeStatus::with_uptime(counter as u32);
            let _ = registry.observe(black_box(address), black_box(status));
        });
    });

    group.finish();
}

fn bench_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation_session");
    group.throughput(Throughput::Elements(3));

    group.bench_function("three_stage_handshake", |b| {
        let mut session = AllocationSession::new();
        b.iter(|| {
            let _ = session.handle_fragment(black_box(&AllocationFragment::first(vec![
                1, 2, 3, 4, 5, 6,
            ])));
            let _ = session.handle_fragment(black_box(&AllocationFragment::followup(
                vec![7, 8, 9, 10, 11, 12],
                None,
            )));
            let _ = session.handle_fragment(black_box(&AllocationFragment::followup(
                vec![13, 14, 15, 16],
                None,
            )));
        });
    });

    group.finish();
}

fn bench_resolve_existing(c: &mut Criterion) {
    let mut group = c.benchmark_group("address_allocator");
    group.throughput(Throughput::Elements(1));

    // Pre-populate a realistic bus: 50 live nodes and one existing grant.
    let registry = NodeRegistry::new();
    for address in 1..=50u8 {
        let _ = registry.observe(
            NodeAddress::new(address).unwrap(),
            NodeStatus::with_uptime(100),
        );
    }
    let allocator = AddressAllocator::new(registry, NodeAddress::new(127).unwrap());
    let unique_id = UniqueId::from([0x42u8; 16]);
    let _ = allocator.resolve(unique_id, None);

    group.bench_function("resolve_existing_grant", |b| {
        b.iter(|| {
            let _ = allocator.resolve(black_box(unique_id), None);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_observe_status,
    bench_handshake,
    bench_resolve_existing,
);
criterion_main!(benches);
