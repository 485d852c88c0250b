//! Debug assertion macros for ring buffer invariants.
//!
//! Active only in debug builds (`debug_assert!` is a no-op in release), so
//! there is zero overhead in release builds.

/// Assert that the gap between the consumer's published position
/// (`read_plus_capacity`) and the producer's published position (`written`)
/// never exceeds the ring's capacity.
///
/// Invariant: `0 <= read_plus_capacity - written <= capacity`.
///
/// Used in: `RingBuffer::reduce_readable()`.
macro_rules! debug_assert_bounded_gap {
    ($read_plus_capacity:expr, $written:expr, $capacity:expr) => {
        debug_assert!(
            $read_plus_capacity >= $written && $read_plus_capacity - $written <= $capacity,
            "bounded gap violated: read_plus_capacity {} written {} capacity {}",
            $read_plus_capacity,
            $written,
            $capacity
        )
    };
}

pub(crate) use debug_assert_bounded_gap;
