//! Criterion benchmarks for the forwarding engine.
//!
//! Measures how long a running bridge takes to move a payload from an
//! in-memory input endpoint to an in-memory output endpoint, for several
//! chunk sizes.
//!
//! Run with:
//! ```bash
//! cargo bench --package bridge-core --bench forward_bench
//! ```

use std::sync::Arc;

use bridge_core::{Bridge, BridgeOptions, EndpointKind, MockEndpoint};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const PAYLOAD_LEN: usize = 256 * 1024;

fn make_payload() -> Vec<u8> {
    (0..PAYLOAD_LEN).map(|i| (i % 251) as u8).collect()
}

/// Starts a bridge, pushes `payload` in 1 KiB pieces and waits until it has
/// all arrived at the output.
async fn pump(payload: &[u8], chunk_size: usize) -> usize {
    let a = MockEndpoint::new("a", EndpointKind::Input);
    let b = MockEndpoint::new("b", EndpointKind::Output);
    let mut bridge = Bridge::new(BridgeOptions {
        chunk_size,
        ..BridgeOptions::default()
    });
    bridge
        .set_in(Arc::new(a.clone()))
        .expect("input must bind");
    bridge
        .set_out(Arc::new(b.clone()))
        .expect("output must bind");
    bridge.start().await.expect("bridge must start");

    for piece in payload.chunks(1024) {
        a.push(piece);
    }
    let received = b.wait_for_sink(payload.len()).await;
    bridge.close().await;
    received.len()
}

fn bench_forward_throughput(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime must build");
    let payload = make_payload();

    let mut group = c.benchmark_group("forward");
    group.throughput(Throughput::Bytes(PAYLOAD_LEN as u64));
    for chunk_size in [256usize, 4096, 16_384] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |bench, &chunk_size| {
                bench.iter(|| runtime.block_on(pump(black_box(&payload), chunk_size)));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_forward_throughput);
criterion_main!(benches);
