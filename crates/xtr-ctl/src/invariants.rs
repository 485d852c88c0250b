//! Debug assertion macros for control channel invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]` via
//! `debug_assert!`), so there is zero overhead in release builds.

// =============================================================================
// INV-CTL-01: Frame Size Bound
// =============================================================================

/// Assert that an encoded frame body never exceeds `MAX_FRAME_SIZE`.
macro_rules! debug_assert_frame_bounded {
    ($len:expr, $max:expr) => {
        debug_assert!(
            $len <= $max,
            "INV-CTL-01 violated: frame body of {} bytes exceeds max {}",
            $len,
            $max
        )
    };
}

// =============================================================================
// INV-CTL-02: Pattern Text Bound
// =============================================================================

/// Assert that a pattern's text never exceeds `MAX_PATTERN_LEN`.
macro_rules! debug_assert_pattern_bounded {
    ($len:expr, $max:expr) => {
        debug_assert!(
            $len <= $max,
            "INV-CTL-02 violated: pattern text of {} bytes exceeds max {}",
            $len,
            $max
        )
    };
}

// =============================================================================
// INV-CTL-03: No Half-Applied Handler Mutation Per Poll Pass
// =============================================================================

/// Assert that requests are dispatched only after the poll pass has
/// finished reading/writing every client, so a `set_level` applied to one
/// client can't be observed partially by a `status` response encoded for
/// another client in the same pass.
macro_rules! debug_assert_dispatch_after_poll {
    ($poll_pass_complete:expr) => {
        debug_assert!(
            $poll_pass_complete,
            "INV-CTL-03 violated: dispatching requests before the poll pass completed"
        )
    };
}

pub(crate) use debug_assert_dispatch_after_poll;
pub(crate) use debug_assert_frame_bounded;
pub(crate) use debug_assert_pattern_bounded;
