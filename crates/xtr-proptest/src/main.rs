//! Seeded, reproducible producer/consumer simulation for the byte ring
//! buffer: fuzzes interleavings of `write_span`/`reduce_writable`/
//! `read_span`/`reduce_readable` from a single thread and checks the same
//! invariants `xtr-ring`'s property tests check, but over much longer
//! random schedules and with a printed seed so a failure can be replayed
//! exactly.
//!
//! Run with `cargo run -p xtr-proptest [seed] [steps]`. With no arguments,
//! picks a seed from the OS RNG and runs 100_000 steps.

use std::collections::VecDeque;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use xtr_ring::{RingBuffer, WriteTag};

struct Simulator {
    ring: RingBuffer,
    rng: SmallRng,
    expected: VecDeque<u8>,
    next_byte: u8,
    produced: u64,
    consumed: u64,
}

impl Simulator {
    fn new(seed: u64) -> Self {
        Self {
            ring: RingBuffer::new(1).unwrap(),
            rng: SmallRng::seed_from_u64(seed),
            expected: VecDeque::new(),
            next_byte: 0,
            produced: 0,
            consumed: 0,
        }
    }

    fn step(&mut self) {
        if self.rng.gen_bool(0.6) {
            self.write();
        } else {
            self.read();
        }
        assert!(
            self.ring.used_bytes() <= self.ring.capacity(),
            "used_bytes {} exceeded capacity {}",
            self.ring.used_bytes(),
            self.ring.capacity()
        );
    }

    fn write(&mut self) {
        let size = self.rng.gen_range(1..=64);
        let mut span = self.ring.write_span(size, WriteTag::NonBlocking);
        if span.is_empty() {
            return;
        }
        let got = span.len().min(size);
        for b in &mut span.as_mut_slice()[..got] {
            *b = self.next_byte;
            self.expected.push_back(self.next_byte);
            self.next_byte = self.next_byte.wrapping_add(1);
        }
        self.ring.reduce_writable(got);
        self.produced += got as u64;
    }

    fn read(&mut self) {
        let span = self.ring.read_span();
        if span.is_empty() {
            return;
        }
        let want = self.rng.gen_range(1..=span.len());
        let bytes = &span.as_slice()[..want];
        for &b in bytes {
            let expected = self.expected.pop_front().expect("consumer read more than was produced");
            assert_eq!(b, expected, "byte mismatch at consumed offset {}", self.consumed);
            self.consumed += 1;
        }
        self.ring.reduce_readable(want);
    }
}

fn main() {
    let mut args = std::env::args().skip(1);
    let seed: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or_else(rand::random);
    let steps: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(100_000);

    println!("xtr-proptest: seed={seed} steps={steps}");
    let mut sim = Simulator::new(seed);
    for _ in 0..steps {
        sim.step();
    }

    assert_eq!(
        sim.expected.len() as u64,
        sim.produced - sim.consumed,
        "shadow queue desynchronized from ring accounting"
    );
    println!(
        "ok: produced={} consumed={} still-pending={} (seed={seed} reproduces this run)",
        sim.produced,
        sim.consumed,
        sim.expected.len()
    );
}
