//! The top-level façade: spawns the consumer thread and vends sinks
//! (`spec.md` 4.9).

use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use xtr_ctl::CommandDispatcher;
use xtr_ring::RingBuffer;

use crate::clock::{system_clock, ClockFn};
use crate::config::{CommandSocket, Config};
use crate::consumer::{Consumer, ConsumerCommand, SinkHandle};
use crate::error::LoggerError;
use crate::level::{AtomicLevel, LogLevel};
use crate::output_buffer::OutputBuffer;
use crate::sink::{Sink, SinkInner, DEFAULT_STYLE};
use crate::style::StyleFn;

/// Owns the background consumer thread and is the sole way to obtain a
/// [`Sink`]. Dropping a `Logger` blocks until the consumer thread exits,
/// which happens once every sink produced from it has closed
/// (`spec.md` 4.9's destruction contract).
pub struct Logger {
    command_tx: Option<mpsc::Sender<ConsumerCommand>>,
    handle: Option<JoinHandle<()>>,
    ring_capacity: usize,
}

impl Logger {
    /// Spawns the consumer thread, opening `path` with the default
    /// storage back-end and binding a control socket per `config`'s
    /// [`CommandSocket`] policy.
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self, LoggerError> {
        let storage = xtr_io::make_fd_storage_with_capacity(path.as_ref(), config.io_buffer_capacity)?;
        Self::with_storage(storage, config)
    }

    /// As [`Logger::open`], but with an already-constructed storage
    /// back-end — the seam integration tests use to substitute an
    /// in-memory recorder.
    pub fn with_storage(storage: Box<dyn xtr_io::StorageBackend + Send>, config: Config) -> Result<Self, LoggerError> {
        Self::with_storage_and_clock(storage, config, system_clock())
    }

    /// As [`Logger::with_storage`], with an explicit clock. Exposed so
    /// integration tests can substitute [`crate::clock::frozen_clock`] for
    /// deterministic timestamp rendering.
    pub fn with_storage_and_clock(
        storage: Box<dyn xtr_io::StorageBackend + Send>,
        config: Config,
        clock: ClockFn,
    ) -> Result<Self, LoggerError> {
        let dispatcher = match config.command_socket {
            CommandSocket::Disabled => None,
            CommandSocket::Default => Some(CommandDispatcher::bind(xtr_ctl::default_command_path())?),
            CommandSocket::Path(ref path) => Some(CommandDispatcher::bind(path)?),
        };

        let output = OutputBuffer::new(storage);
        let (command_tx, command_rx) = mpsc::channel();
        let consumer = Consumer::new(output, command_rx, dispatcher, clock, config.flush_every_n_rounds);
        let handle = std::thread::Builder::new()
            .name("xtr-consumer".into())
            .spawn(move || consumer.run())
            .expect("failed to spawn consumer thread");

        Ok(Self { command_tx: Some(command_tx), handle: Some(handle), ring_capacity: config.ring_capacity })
    }

    /// Registers and returns a new sink with the given name, at
    /// [`LogLevel::Info`] by default and [`crate::style::default_log_level_style`]
    /// as its style function.
    pub fn get_sink(&self, name: impl Into<String>) -> Result<Sink, LoggerError> {
        self.get_sink_with(name, LogLevel::Info, DEFAULT_STYLE)
    }

    /// As [`Logger::get_sink`], with an explicit initial level and style.
    pub fn get_sink_with(&self, name: impl Into<String>, level: LogLevel, style: StyleFn) -> Result<Sink, LoggerError> {
        let name = name.into();
        if name.len() > xtr_ctl::wire::MAX_NAME_LEN {
            return Err(LoggerError::NameTooLong(name));
        }
        let ring = RingBuffer::new(self.ring_capacity)?;
        let inner = Arc::new(SinkInner { ring, level: AtomicLevel::new(level), style, name: Mutex::new(name) });
        let command_tx = self.command_tx.as_ref().ok_or(LoggerError::ConsumerGone)?.clone();
        command_tx
            .send(ConsumerCommand::Register(SinkHandle::new(inner.clone())))
            .map_err(|_| LoggerError::ConsumerGone)?;
        Ok(Sink::from_parts(inner, command_tx, self.ring_capacity))
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        // Dropping our own sender lets the consumer's `recv()` observe a
        // disconnected channel once every sink-held clone has also been
        // dropped (each `Sink` closes itself on drop), so it can exit the
        // scheduling loop and this `join()` can complete.
        self.command_tx.take();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                tracing::error!(?e, "consumer thread panicked");
            }
        }
    }
}
