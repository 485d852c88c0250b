//! The control channel wire protocol: requests a client (`xtrctl`) may send
//! to a running logger's command socket, and the responses it gets back.
//!
//! Grounded in the original library's `detail::commands` frame definitions
//! (`status`, `set_level`, `reopen`, `sink_info`, `success`, `error`): there
//! the wire format is a fixed 512-byte frame with a `u32` frame id header,
//! built for a no-exceptions, no-allocation C++ control path. Here the same
//! message shapes are carried over `bincode`-encoded, length-prefixed frames
//! instead of a raw `memcpy`'d struct — idiomatic for a Rust pair of ends
//! that both already depend on `serde`, and it sidesteps needing a hand
//! written struct layout for what the C++ side gets from `offsetof`.

use serde::{Deserialize, Serialize};

use crate::invariants::{debug_assert_frame_bounded, debug_assert_pattern_bounded};

/// Frames larger than this are rejected before being decoded, bounding how
/// much a misbehaving peer can make a dispatcher allocate.
pub const MAX_FRAME_SIZE: u32 = 4096;

/// Upper bound on a pattern's text length, mirroring the `char text[256]`
/// field of the original `pattern` struct (one byte reserved for the NUL
/// the C++ side stores explicitly).
pub const MAX_PATTERN_LEN: usize = 255;

/// Upper bound on a sink name, mirroring `sink_info::name`'s `char[128]`.
pub const MAX_NAME_LEN: usize = 127;

/// How a [`Pattern`]'s text should be interpreted when matching sink names.
///
/// Mirrors `xtr::detail::pattern_type_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    /// No filtering; every sink matches.
    None,
    /// POSIX extended regular expression (`REG_EXTENDED`).
    ExtendedRegex,
    /// POSIX basic regular expression.
    BasicRegex,
    /// Shell-style glob (`*`, `?`).
    Wildcard,
}

/// A sink-name filter attached to `status`/`set_level` requests.
///
/// Mirrors `xtr::detail::pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub ignore_case: bool,
    pub text: String,
}

impl Pattern {
    /// The pattern that matches every sink, used when a client omits `-p`.
    pub fn any() -> Self {
        Self { kind: PatternKind::None, ignore_case: false, text: String::new() }
    }

    pub fn new(kind: PatternKind, ignore_case: bool, text: impl Into<String>) -> Result<Self, WireError> {
        let text = text.into();
        if text.len() > MAX_PATTERN_LEN {
            return Err(WireError::PatternTooLong(text.len()));
        }
        debug_assert_pattern_bounded!(text.len(), MAX_PATTERN_LEN);
        Ok(Self { kind, ignore_case, text })
    }
}

/// A request sent from `xtrctl` to a logger's command dispatcher.
///
/// Mirrors the `status`, `set_level` and `reopen` request frames of
/// `single_include/xtr/logger.hpp`. `Reopen` carries no pattern in the
/// original struct (it is a bare `frame_id`-only message), so it reopens
/// every sink's storage unconditionally rather than being sink-scoped; see
/// `DESIGN.md` for this decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// List sinks matching `pattern` along with their current state.
    Status(Pattern),
    /// Set the log level of sinks matching `pattern`.
    SetLevel { level: u8, pattern: Pattern },
    /// Reopen every sink's underlying storage (e.g. after `logrotate`).
    Reopen,
}

/// A single sink's reported state, mirroring `xtr::detail::sink_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkInfo {
    pub level: u8,
    pub buf_capacity: u64,
    pub buf_nbytes: u64,
    pub dropped_count: u64,
    pub name: String,
}

/// A response sent back from the command dispatcher to `xtrctl`.
///
/// Mirrors `sink_info`, `success` and `error`. Where the C++ protocol sends
/// one `sink_info` frame per matching sink, a single [`Response::Status`]
/// batches them since a length-prefixed Rust frame is not size-constrained
/// the way the fixed 512-byte C frame is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Status(Vec<SinkInfo>),
    Success,
    Error { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("pattern text of {0} bytes exceeds the {MAX_PATTERN_LEN}-byte limit")]
    PatternTooLong(usize),
    #[error("sink name of {0} bytes exceeds the {MAX_NAME_LEN}-byte limit")]
    NameTooLong(usize),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_SIZE}-byte limit")]
    FrameTooLarge(u32),
    #[error("frame encoding failed: {0}")]
    Encode(#[from] Box<bincode::ErrorKind>),
    #[error("i/o error on control channel: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer closed the connection")]
    Closed,
}

impl SinkInfo {
    pub fn new(level: u8, buf_capacity: u64, buf_nbytes: u64, dropped_count: u64, name: impl Into<String>) -> Result<Self, WireError> {
        let name = name.into();
        if name.len() > MAX_NAME_LEN {
            return Err(WireError::NameTooLong(name.len()));
        }
        Ok(Self { level, buf_capacity, buf_nbytes, dropped_count, name })
    }
}

/// Encodes `frame` as a `u32` little-endian length prefix followed by its
/// `bincode` body, writing the result to `out`.
pub fn encode_frame<T: Serialize>(frame: &T, out: &mut Vec<u8>) -> Result<(), WireError> {
    let body = bincode::serialize(frame)?;
    let len = u32::try_from(body.len()).map_err(|_| WireError::FrameTooLarge(u32::MAX))?;
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge(len));
    }
    debug_assert_frame_bounded!(len, MAX_FRAME_SIZE);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(())
}

/// Attempts to decode one length-prefixed frame from the front of `buf`,
/// returning the decoded value and the number of bytes consumed. Returns
/// `Ok(None)` if `buf` does not yet contain a complete frame.
pub fn try_decode_frame<T: for<'de> Deserialize<'de>>(
    buf: &[u8],
) -> Result<Option<(T, usize)>, WireError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge(len));
    }
    let total = 4 + len as usize;
    if buf.len() < total {
        return Ok(None);
    }
    let value = bincode::deserialize(&buf[4..total])?;
    Ok(Some((value, total)))
}
