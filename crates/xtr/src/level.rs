//! Log levels, ordered from most to least restrictive.

use std::sync::atomic::{AtomicU8, Ordering};

/// A sink's configured verbosity threshold, and the level a call site logs
/// at. A record logs when `sink.level() >= call_level`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Nothing is logged.
    None = 0,
    /// Logged, then the process aborts after syncing.
    Fatal = 1,
    Error = 2,
    Warning = 3,
    Info = 4,
    Debug = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::Fatal),
            2 => Some(Self::Error),
            3 => Some(Self::Warning),
            4 => Some(Self::Info),
            5 => Some(Self::Debug),
            _ => None,
        }
    }
}

/// An atomic, relaxed-ordering holder for a sink's level, shared between the
/// producer-side `Sink` and the consumer-side sink registry entry so that
/// `set_level`/`level` and the `set-level` control command all observe and
/// mutate the same cell (`spec.md` 4.4, 5).
#[derive(Debug)]
pub struct AtomicLevel(AtomicU8);

impl AtomicLevel {
    pub fn new(level: LogLevel) -> Self {
        Self(AtomicU8::new(level as u8))
    }

    pub fn load(&self) -> LogLevel {
        LogLevel::from_u8(self.0.load(Ordering::Relaxed)).unwrap_or(LogLevel::Info)
    }

    pub fn store(&self, level: LogLevel) {
        self.0.store(level as u8, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_fatal_lowest_debug_highest() {
        assert!(LogLevel::Fatal < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
    }

    #[test]
    fn threshold_check_matches_spec() {
        let sink_level = LogLevel::Info;
        assert!(sink_level >= LogLevel::Warning);
        assert!(sink_level >= LogLevel::Info);
        assert!(!(sink_level >= LogLevel::Debug));
    }

    #[test]
    fn atomic_level_round_trips() {
        let level = AtomicLevel::new(LogLevel::Warning);
        assert_eq!(level.load(), LogLevel::Warning);
        level.store(LogLevel::Debug);
        assert_eq!(level.load(), LogLevel::Debug);
    }
}
