//! `xtr`: an asynchronous, low-latency structured logger.
//!
//! A [`Logger`] owns a background consumer thread; [`Logger::get_sink`]
//! vends a [`Sink`] that producer threads log through. Each sink is a
//! single-producer/single-consumer ring buffer (`xtr_ring::RingBuffer`);
//! logging a record never blocks on I/O, allocates on the fast path, or
//! touches a lock — the consumer thread alone renders lines and writes
//! them out through a pluggable [`xtr_io::StorageBackend`].
//!
//! ```no_run
//! use xtr::{Config, Logger, LogLevel, WriteTag};
//!
//! let logger = Logger::open("/tmp/app.log", Config::default())?;
//! let sink = logger.get_sink("main")?;
//! sink.log(WriteTag::Blocking, LogLevel::Info, "src/main.rs:1", "hello");
//! # Ok::<(), xtr::LoggerError>(())
//! ```

mod clock;
mod config;
mod consumer;
mod error;
mod level;
mod logger;
mod output_buffer;
mod record;
mod sink;
mod style;

pub use clock::{frozen_clock, system_clock, ClockFn, Nanos};
pub use config::{CommandSocket, Config};
pub use error::LoggerError;
pub use level::LogLevel;
pub use logger::Logger;
pub use record::EncodeOutcome;
pub use sink::{escape_into, Sink};
pub use style::{default_log_level_style, systemd_log_level_style, StyleFn};
pub use xtr_ring::WriteTag;
