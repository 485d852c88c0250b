//! Logger-wide tuning knobs, grounded in `ringmpsc`'s own `Config` (preset
//! constants for common deployment shapes, rather than exposing every knob
//! as a separate builder call).

use std::path::PathBuf;

/// Where (if anywhere) the control channel's Unix socket should be bound.
#[derive(Debug, Clone, Default)]
pub enum CommandSocket {
    /// Bind at the logger's process/uid-derived default path
    /// (`xtr_ctl::default_command_path`).
    #[default]
    Default,
    /// Don't bind a control socket at all.
    Disabled,
    /// Bind at an explicit path.
    Path(PathBuf),
}

/// Tuning knobs for a [`crate::logger::Logger`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Minimum size, in bytes, of each sink's ring buffer. Rounded up to a
    /// power-of-two multiple of the page size by `xtr_ring::RingBuffer`.
    pub ring_capacity: usize,
    /// Size, in bytes, of the consumer's storage-backend scratch buffer.
    pub io_buffer_capacity: usize,
    /// How many consumer scheduling rounds to let pass before flushing a
    /// sink with no new records (`spec.md` 4.8's `flush_countdown`).
    pub flush_every_n_rounds: u32,
    pub command_socket: CommandSocket,
}

impl Config {
    /// Panics if `ring_capacity` is smaller than a single page, since a
    /// ring that can't hold a full page can never make forward progress
    /// under the mirrored-mapping scheme.
    pub fn new(ring_capacity: usize, io_buffer_capacity: usize, flush_every_n_rounds: u32) -> Self {
        assert!(ring_capacity >= 4096, "ring_capacity must be at least one page");
        assert!(io_buffer_capacity > 0, "io_buffer_capacity must be non-zero");
        assert!(flush_every_n_rounds > 0, "flush_every_n_rounds must be non-zero");
        Self {
            ring_capacity,
            io_buffer_capacity,
            flush_every_n_rounds,
            command_socket: CommandSocket::Default,
        }
    }

    /// Small rings, frequent flushes: favors latency over throughput.
    pub fn low_latency() -> Self {
        Self::new(64 * 1024, 16 * 1024, 1)
    }

    /// Large rings, infrequent flushes: favors throughput over latency.
    pub fn high_throughput() -> Self {
        Self::new(4 * 1024 * 1024, 256 * 1024, 64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(256 * 1024, 64 * 1024, 8)
    }
}
