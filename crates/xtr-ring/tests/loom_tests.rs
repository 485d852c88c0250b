//! Loom-based concurrency tests for the byte ring buffer's synchronization
//! protocol.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Loom exhaustively explores thread interleavings, so it can't run against
//! code backed by real `mmap`/`mremap` (loom replaces `std::sync` atomics
//! with instrumented equivalents, but has no view into raw syscalls). This
//! models the same `written`/`read_plus_capacity` protocol used by
//! `RingBuffer` against a fixed-size array instead of a mirrored mapping.

#![cfg(feature = "loom")]

use loom::sync::atomic::{AtomicU64, Ordering};
use loom::sync::Arc;
use loom::thread;
use std::cell::UnsafeCell;

const CAP: u64 = 4;

struct LoomRing {
    written: AtomicU64,
    read_plus_capacity: AtomicU64,
    buffer: UnsafeCell<[u8; CAP as usize]>,
}

unsafe impl Send for LoomRing {}
unsafe impl Sync for LoomRing {}

impl LoomRing {
    fn new() -> Self {
        Self {
            written: AtomicU64::new(0),
            read_plus_capacity: AtomicU64::new(CAP),
            buffer: UnsafeCell::new([0; CAP as usize]),
        }
    }

    fn clamp(n: u64) -> usize {
        (n % CAP) as usize
    }

    /// Producer: write one byte if there's room (non-blocking semantics).
    fn try_push(&self, value: u8) -> bool {
        let written = self.written.load(Ordering::Relaxed);
        let rpc = self.read_plus_capacity.load(Ordering::Acquire);
        if rpc - written < 1 {
            return false;
        }
        let idx = Self::clamp(written);
        // SAFETY: single producer, and the acquire load above established
        // the consumer has released this slot.
        unsafe {
            (*self.buffer.get())[idx] = value;
        }
        self.written.store(written + 1, Ordering::Release);
        true
    }

    /// Consumer: read one byte if available.
    fn try_pop(&self) -> Option<u8> {
        let rpc = self.read_plus_capacity.load(Ordering::Relaxed);
        let nr = rpc - CAP;
        let written = self.written.load(Ordering::Acquire);
        if written - nr < 1 {
            return None;
        }
        let idx = Self::clamp(nr);
        // SAFETY: the acquire load above established the producer
        // published this slot.
        let value = unsafe { (*self.buffer.get())[idx] };
        self.read_plus_capacity.store(rpc + 1, Ordering::Release);
        Some(value)
    }
}

#[test]
fn loom_spsc_basic_fifo() {
    loom::model(|| {
        let ring = Arc::new(LoomRing::new());
        let ring2 = Arc::clone(&ring);

        let producer = thread::spawn(move || {
            ring2.try_push(42);
            ring2.try_push(43);
        });

        let consumer = thread::spawn(move || {
            let mut received = Vec::new();
            for _ in 0..10 {
                if let Some(v) = ring.try_pop() {
                    received.push(v);
                }
                if received.len() == 2 {
                    break;
                }
                loom::thread::yield_now();
            }
            received
        });

        producer.join().unwrap();
        let received = consumer.join().unwrap();

        if received.len() >= 2 {
            assert_eq!(received[0], 42);
            assert_eq!(received[1], 43);
        }
    });
}

#[test]
fn loom_spsc_full_ring_rejects_write() {
    loom::model(|| {
        let ring = Arc::new(LoomRing::new());
        let ring2 = Arc::clone(&ring);

        for v in 0..CAP as u8 {
            assert!(ring.try_push(v));
        }
        assert!(!ring.try_push(99));

        let consumer = thread::spawn(move || ring2.try_pop());
        let value = consumer.join().unwrap();
        assert_eq!(value, Some(0));

        assert!(ring.try_push(99));
    });
}

#[test]
fn loom_spsc_never_reads_unpublished_bytes() {
    loom::model(|| {
        let ring = Arc::new(LoomRing::new());
        let ring_producer = Arc::clone(&ring);
        let ring_consumer = Arc::clone(&ring);

        let producer = thread::spawn(move || {
            ring_producer.try_push(7);
        });

        let consumer = thread::spawn(move || {
            // A pop before the producer's release store must see nothing,
            // never a torn or stale value.
            ring_consumer.try_pop()
        });

        producer.join().unwrap();
        let popped = consumer.join().unwrap();
        assert!(popped.is_none() || popped == Some(7));
    });
}
