//! Property-based tests for the byte ring buffer, checking the invariants
//! documented in `spec.md` 4.2 and 4.8 hold under arbitrary write/read
//! sequences.

use proptest::prelude::*;
use xtr_ring::{RingBuffer, WriteTag};

fn small_ring() -> RingBuffer {
    // Smallest legal capacity is one page; plenty of room to exercise
    // wraparound with small record sizes.
    RingBuffer::new(1).unwrap()
}

proptest! {
    /// INV: the consumer never observes more bytes than the producer has
    /// published, and the gap never exceeds capacity.
    #[test]
    fn prop_bounded_gap(
        sizes in prop::collection::vec(1usize..64, 1..200),
    ) {
        let ring = small_ring();
        let cap = ring.capacity();

        for size in sizes {
            let mut span = ring.write_span(size, WriteTag::NonBlocking);
            if span.is_empty() {
                // Drained enough to keep the loop making progress.
                let read = ring.read_span();
                let n = read.len();
                if n > 0 {
                    ring.reduce_readable(n);
                }
                continue;
            }
            prop_assert!(span.len() >= size);
            span.as_mut_slice()[..size].fill(0xAB);
            ring.reduce_writable(size);

            let read = ring.read_span();
            prop_assert!(read.len() <= cap);
        }
    }

    /// INV: data read back matches data written, in FIFO order, even across
    /// the wrap point of the mirrored mapping.
    #[test]
    fn prop_fifo_order_preserved(
        values in prop::collection::vec(any::<u64>(), 1..500),
    ) {
        let ring = small_ring();

        for v in &values {
            let bytes = v.to_le_bytes();
            let mut span = ring.write_span(8, WriteTag::Blocking);
            span.as_mut_slice()[..8].copy_from_slice(&bytes);
            ring.reduce_writable(8);

            let read = ring.read_span();
            prop_assert!(read.len() >= 8);
            let mut got = [0u8; 8];
            got.copy_from_slice(&read.as_slice()[..8]);
            prop_assert_eq!(u64::from_le_bytes(got), *v);
            ring.reduce_readable(8);
        }
    }

    /// INV: a non-blocking write that cannot fit increments the drop
    /// counter exactly once per refusal and never corrupts the buffer.
    #[test]
    fn prop_non_blocking_drops_are_counted(
        fill_first in 0usize..4096,
    ) {
        let ring = small_ring();
        let cap = ring.capacity();

        let first = ring.write_span(cap, WriteTag::Blocking);
        prop_assert_eq!(first.len(), cap);
        ring.reduce_writable(cap);

        let mut expected_drops = 0usize;
        for _ in 0..(fill_first % 8 + 1) {
            let span = ring.write_span(1, WriteTag::NonBlocking);
            prop_assert!(span.is_empty());
            expected_drops += 1;
        }
        prop_assert_eq!(ring.take_dropped_count(), expected_drops);
        prop_assert_eq!(ring.take_dropped_count(), 0);
    }
}
