//! The single-producer/single-consumer byte ring buffer (`spec.md` 4.2).
//!
//! Generalized from the teacher's typed `Ring<T>`: the synchronization
//! protocol (two atomics on separate cache lines, a producer-local shadow of
//! the consumer's published position) is unchanged, but slots are raw bytes
//! inside a [`MirroredRegion`] instead of `MaybeUninit<T>` elements in a flat
//! `Vec`, which lets `write_span`/`read_span` return genuinely contiguous
//! byte spans across the wrap point. Grounded in
//! `original_source/include/xtr/detail/synchronized_ring_buffer.hpp`.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::backoff::Backoff;
use crate::invariants::debug_assert_bounded_gap;
use crate::mirror::{MirrorError, MirroredRegion};

#[repr(align(128))]
struct CacheAligned<T>(T);

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

/// How `write_span` should behave when there is insufficient room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTag {
    /// Spin (with a CPU-pause backoff) until enough space is available.
    Blocking,
    /// Try once; if there still isn't enough room, count a drop and return
    /// an empty span.
    NonBlocking,
    /// Use the producer's last cached view of the reader's position without
    /// re-reading the shared atomic. Intended for a write the caller already
    /// knows will fit (e.g. a second span requested within the same record).
    Speculative,
}

/// A contiguous byte span into the ring's mirrored region.
#[derive(Debug)]
pub struct Span {
    ptr: *mut u8,
    len: usize,
}

impl Span {
    #[inline]
    fn empty() -> Self {
        Self { ptr: std::ptr::null_mut(), len: 0 }
    }

    #[inline]
    pub fn begin(&self) -> *mut u8 {
        self.ptr
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        if self.ptr.is_null() {
            &[]
        } else {
            // SAFETY: derived from a valid, live range of the ring's
            // mirrored region by `write_span`/`read_span`.
            unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.ptr.is_null() {
            &mut []
        } else {
            // SAFETY: see `as_slice`; the SPSC protocol guarantees this span
            // has no concurrent aliasing writer.
            unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
        }
    }
}

/// A lock-free, single-producer/single-consumer byte ring buffer backed by
/// a mirrored virtual memory mapping.
pub struct RingBuffer {
    // Written by the producer, read (Acquire) by the consumer.
    written: CacheAligned<AtomicU64>,

    // Producer-local shadow state; touched only by the single writer.
    wr_base: *mut u8,
    wr_capacity: usize,
    wr_read_plus_capacity: UnsafeCell<u64>,
    wr_written: UnsafeCell<u64>,

    // Written by the consumer, read (Acquire) by the producer.
    read_plus_capacity: CacheAligned<AtomicU64>,
    region: MirroredRegion,

    // Written by both sides (relaxed counter, no protocol dependency on it).
    dropped_count: CacheAligned<AtomicUsize>,
}

// SAFETY: all cross-thread communication goes through the `written` and
// `read_plus_capacity` atomics with acquire/release pairing; the raw
// pointers are derived from the `MirroredRegion`, which is itself `Send +
// Sync`. The `UnsafeCell` shadow fields are only ever touched by the single
// producer thread that owns the writer half of the API.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Creates a new ring buffer of at least `min_capacity` bytes, rounded
    /// up to the next power-of-two multiple of the page size.
    pub fn new(min_capacity: usize) -> Result<Self, MirrorError> {
        let capacity =
            crate::pagesize::align_to_page_size(min_capacity.max(1)).next_power_of_two();
        let region = MirroredRegion::new(capacity)?;
        let base = region.as_ptr();
        Ok(Self {
            written: CacheAligned(AtomicU64::new(0)),
            wr_base: base,
            wr_capacity: capacity,
            wr_read_plus_capacity: UnsafeCell::new(capacity as u64),
            wr_written: UnsafeCell::new(0),
            read_plus_capacity: CacheAligned(AtomicU64::new(capacity as u64)),
            region,
            dropped_count: CacheAligned(AtomicUsize::new(0)),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.wr_capacity
    }

    #[inline]
    fn clamp(&self, n: u64) -> usize {
        (n as usize) & (self.wr_capacity - 1)
    }

    /// Pointer to the start of the low mapping.
    #[inline]
    pub fn begin(&self) -> *mut u8 {
        self.region.as_ptr()
    }

    /// Pointer to one past the end of the low mapping — the wrap point a
    /// single record must never be read across (`spec.md` 4.8).
    #[inline]
    pub fn end_of_first_mapping(&self) -> *mut u8 {
        // SAFETY: `capacity()` is exactly the length of the low mapping.
        unsafe { self.begin().add(self.capacity()) }
    }

    /// Returns a contiguous writable span of at least `min_size` bytes,
    /// per the `tag` discipline described in `spec.md` 4.2. Must only be
    /// called from the single producer thread.
    pub fn write_span(&self, min_size: usize, tag: WriteTag) -> Span {
        debug_assert!(min_size <= self.wr_capacity);

        // SAFETY: single-writer access to the shadow cells.
        let wr_read_plus_capacity = unsafe { &mut *self.wr_read_plus_capacity.get() };
        let wr_written = unsafe { &mut *self.wr_written.get() };

        if tag != WriteTag::Speculative {
            *wr_read_plus_capacity = self.read_plus_capacity.load(Ordering::Acquire);
        }

        let mut sz = *wr_read_plus_capacity - *wr_written;
        let begin_off = self.clamp(*wr_written);
        // SAFETY: `begin_off` is within `[0, capacity)` and the mirrored
        // region guarantees `[begin_off, begin_off + capacity)` is mapped.
        let base = unsafe { self.wr_base.add(begin_off) };

        if (sz as usize) < min_size {
            let mut backoff = Backoff::new();
            loop {
                if tag == WriteTag::Blocking {
                    backoff.spin();
                }
                *wr_read_plus_capacity = self.read_plus_capacity.load(Ordering::Acquire);
                sz = *wr_read_plus_capacity - *wr_written;
                if (sz as usize) >= min_size || tag == WriteTag::NonBlocking {
                    break;
                }
            }
        }

        if tag == WriteTag::NonBlocking && (sz as usize) < min_size {
            self.dropped_count.fetch_add(1, Ordering::Relaxed);
            return Span::empty();
        }

        Span { ptr: base, len: sz as usize }
    }

    /// Publishes `n` bytes written via the span returned from `write_span`.
    /// Must only be called from the single producer thread.
    pub fn reduce_writable(&self, n: usize) {
        // SAFETY: single-writer access to the shadow cell.
        let wr_written = unsafe { &mut *self.wr_written.get() };
        #[cfg(debug_assertions)]
        {
            let wr_read_plus_capacity = unsafe { *self.wr_read_plus_capacity.get() };
            debug_assert!(*wr_written + n as u64 <= wr_read_plus_capacity);
        }
        *wr_written += n as u64;
        // Release: publishes the just-written bytes to the consumer.
        self.written.store(*wr_written, Ordering::Release);
    }

    /// Returns a contiguous readable span, capped to never cross the end of
    /// the low mapping. Must only be called from the single consumer
    /// thread.
    pub fn read_span(&self) -> Span {
        let rpc = self.read_plus_capacity.load(Ordering::Relaxed);
        let nr = rpc - self.capacity() as u64;
        let begin_off = self.clamp(nr);
        // SAFETY: see `write_span`.
        let base = unsafe { self.begin().add(begin_off) };
        // Acquire: synchronizes-with the producer's release in
        // `reduce_writable`.
        let written = self.written.load(Ordering::Acquire);
        let sz = written - nr;

        Span { ptr: base, len: sz as usize }
    }

    /// Releases `n` bytes back to the producer after the consumer has
    /// finished reading them. Must only be called from the single consumer
    /// thread.
    pub fn reduce_readable(&self, n: usize) {
        let rpc = self.read_plus_capacity.fetch_add(n as u64, Ordering::Release) + n as u64;
        #[cfg(debug_assertions)]
        {
            let written = self.written.load(Ordering::Relaxed);
            debug_assert_bounded_gap!(rpc, written, self.capacity() as u64);
        }
    }

    /// Returns and resets the count of non-blocking writes refused for lack
    /// of space.
    pub fn take_dropped_count(&self) -> usize {
        self.dropped_count.swap(0, Ordering::Relaxed)
    }

    /// Returns an approximation of how many bytes are currently unread,
    /// for status reporting. Racy with respect to concurrent producer
    /// activity (like everything else read cross-thread without a paired
    /// acquire/release handshake at the call site), intended only as a
    /// point-in-time gauge.
    pub fn used_bytes(&self) -> usize {
        let written = self.written.load(Ordering::Relaxed);
        let read_plus_capacity = self.read_plus_capacity.load(Ordering::Relaxed);
        (written + self.capacity() as u64 - read_plus_capacity) as usize
    }

    /// Resets the buffer's bookkeeping, for reuse by a freshly (re-)opened
    /// sink (`spec.md` 4.4).
    ///
    /// # Safety
    /// The caller must ensure no producer or consumer holds an outstanding
    /// span into this buffer when this is called.
    pub unsafe fn clear(&self) {
        self.written.store(0, Ordering::Relaxed);
        self.read_plus_capacity.store(self.capacity() as u64, Ordering::Relaxed);
        *self.wr_written.get() = 0;
        *self.wr_read_plus_capacity.get() = self.capacity() as u64;
        self.dropped_count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trip() {
        let ring = RingBuffer::new(4096).unwrap();
        let mut span = ring.write_span(5, WriteTag::Blocking);
        span.as_mut_slice()[..5].copy_from_slice(b"hello");
        ring.reduce_writable(5);

        let read = ring.read_span();
        assert_eq!(&read.as_slice()[..5], b"hello");
        ring.reduce_readable(5);

        assert!(ring.read_span().is_empty());
    }

    #[test]
    fn non_blocking_drop_when_full() {
        let ring = RingBuffer::new(4096).unwrap();
        let cap = ring.capacity();

        let span = ring.write_span(cap, WriteTag::Blocking);
        assert_eq!(span.len(), cap);
        ring.reduce_writable(cap);

        let empty = ring.write_span(1, WriteTag::NonBlocking);
        assert!(empty.is_empty());
        assert_eq!(ring.take_dropped_count(), 1);
    }

    #[test]
    fn gap_invariant_never_exceeds_capacity() {
        let ring = RingBuffer::new(4096).unwrap();
        let cap = ring.capacity() as u64;
        for _ in 0..1000 {
            let mut span = ring.write_span(8, WriteTag::Blocking);
            span.as_mut_slice()[..8].fill(0x42);
            ring.reduce_writable(8);

            let rpc = ring.read_plus_capacity.load(Ordering::Relaxed);
            let written = ring.written.load(Ordering::Relaxed);
            assert!(rpc - written <= cap);

            let read = ring.read_span();
            let n = read.len();
            ring.reduce_readable(n);
        }
    }

    #[test]
    fn wrap_around_yields_contiguous_spans() {
        let ring = RingBuffer::new(4096).unwrap();
        let cap = ring.capacity();
        for i in 0..(cap / 8 * 3) {
            let mut span = ring.write_span(8, WriteTag::Blocking);
            span.as_mut_slice()[..8].copy_from_slice(&(i as u64).to_le_bytes());
            ring.reduce_writable(8);

            let read = ring.read_span();
            assert!(read.len() >= 8);
            assert_eq!(&read.as_slice()[..8], &(i as u64).to_le_bytes());
            ring.reduce_readable(8);
        }
    }

    #[test]
    fn speculative_write_reuses_cached_reader_position() {
        let ring = RingBuffer::new(4096).unwrap();
        let first = ring.write_span(8, WriteTag::Blocking);
        assert!(first.len() >= 8);
        // A speculative call right after must still see room, without the
        // consumer having done anything.
        let second = ring.write_span(8, WriteTag::Speculative);
        assert!(second.len() >= 8);
    }
}
