use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use xtr_ring::{RingBuffer, WriteTag};

fn bench_spsc_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_spsc");

    for record_size in [8usize, 64, 256] {
        group.bench_function(format!("write_read_{record_size}b"), |b| {
            b.iter_batched(
                || RingBuffer::new(1 << 20).unwrap(),
                |ring| {
                    for _ in 0..1000 {
                        let mut span = ring.write_span(record_size, WriteTag::Blocking);
                        span.as_mut_slice()[..record_size].fill(0x5A);
                        ring.reduce_writable(record_size);

                        let read = ring.read_span();
                        criterion::black_box(read.as_slice());
                        let n = read.len();
                        ring.reduce_readable(n);
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_non_blocking_under_backpressure(c: &mut Criterion) {
    c.bench_function("ring_spsc_non_blocking_full", |b| {
        let ring = RingBuffer::new(4096).unwrap();
        let cap = ring.capacity();
        let span = ring.write_span(cap, WriteTag::Blocking);
        debug_assert_eq!(span.len(), cap);
        ring.reduce_writable(cap);

        b.iter(|| {
            let span = ring.write_span(64, WriteTag::NonBlocking);
            criterion::black_box(span.is_empty());
        });
    });
}

criterion_group!(benches, bench_spsc_roundtrip, bench_non_blocking_under_backpressure);
criterion_main!(benches);
