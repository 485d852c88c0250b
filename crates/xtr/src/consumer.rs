//! The background consumer thread: round-robin scheduler over a registry
//! of sinks, plus the control-channel bridge (`spec.md` 4.8).
//!
//! New-sink registration is carried over a plain `std::sync::mpsc` channel
//! rather than a dedicated "control sink" ring buffer. Registration is
//! rare (one `Logger::get_sink`/`Sink::try_clone` call, not a hot-path
//! event), so it doesn't need the ring's sub-microsecond non-blocking
//! guarantee; `close`/`sync`, by contrast, stay genuine in-ring records so
//! they're strictly ordered against the log calls that precede them on
//! the same sink.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use xtr_ctl::{CommandDispatcher, CommandHandler, CtlError, Pattern, SinkInfo};

use crate::clock::{render_timestamp, ClockFn};
use crate::record::{dispatch, RenderCtx};
use crate::output_buffer::OutputBuffer;
use crate::sink::SinkInner;

/// Requests posted to the consumer from producer-side code.
pub(crate) enum ConsumerCommand {
    Register(SinkHandle),
}

/// The consumer's non-owning view of one registered sink: the shared
/// state plus bookkeeping the consumer alone is allowed to mutate.
pub(crate) struct SinkHandle {
    inner: Arc<SinkInner>,
    /// Cumulative count of non-blocking writes this sink has refused for
    /// lack of space, updated whenever the consumer drains the ring's own
    /// (resettable) counter during a quiescent moment (`spec.md` 4.8). A
    /// `status` query in between two such moments under-reports by
    /// whatever the ring is currently holding unreported; it is never
    /// reset by a status query itself.
    dropped_total: u64,
}

impl SinkHandle {
    pub(crate) fn new(inner: Arc<SinkInner>) -> Self {
        Self { inner, dropped_total: 0 }
    }

    fn name(&self) -> String {
        self.inner.name.lock().unwrap().clone()
    }
}

/// Owns the registry of sinks and the single shared [`OutputBuffer`]
/// every sink's rendered lines are written through, and drives the
/// round-robin scheduling loop until every sink has closed and no further
/// registration is possible.
pub(crate) struct Consumer {
    registry: Vec<SinkHandle>,
    output: OutputBuffer,
    commands: mpsc::Receiver<ConsumerCommand>,
    dispatcher: Option<CommandDispatcher>,
    clock: ClockFn,
    flush_every_n_rounds: u32,
}

impl Consumer {
    pub(crate) fn new(
        output: OutputBuffer,
        commands: mpsc::Receiver<ConsumerCommand>,
        dispatcher: Option<CommandDispatcher>,
        clock: ClockFn,
        flush_every_n_rounds: u32,
    ) -> Self {
        Self { registry: Vec::new(), output, commands, dispatcher, clock, flush_every_n_rounds }
    }

    /// Drains any registrations waiting on the command channel without
    /// blocking, mirroring the zero-timeout control-channel poll at the
    /// top of each full sweep.
    fn drain_registrations(&mut self) {
        while let Ok(ConsumerCommand::Register(handle)) = self.commands.try_recv() {
            self.registry.push(handle);
        }
    }

    fn poll_control_channel(&mut self) {
        if let Some(mut dispatcher) = self.dispatcher.take() {
            let mut handler = ConsumerHandler { registry: &mut self.registry, output: &mut self.output };
            if let Err(e) = dispatcher.process_commands(Duration::from_secs(0), &mut handler) {
                tracing::warn!(error = %e, "control channel poll failed");
            }
            self.dispatcher = Some(dispatcher);
        }
    }

    /// Runs the scheduling loop described in `spec.md` 4.8 until the sink
    /// registry is empty and no sender remains that could register a new
    /// one.
    pub(crate) fn run(mut self) {
        let mut i: usize = 0;
        let mut flush_countdown: u32 = 0;
        let mut timestamp_stale = true;
        let mut timestamp_buf: Vec<u8> = Vec::with_capacity(32);
        let mut timestamp_text = String::new();

        loop {
            if self.registry.is_empty() {
                match self.commands.recv() {
                    Ok(ConsumerCommand::Register(handle)) => {
                        self.registry.push(handle);
                        i = 0;
                        timestamp_stale = true;
                        continue;
                    }
                    Err(mpsc::RecvError) => break,
                }
            }

            let n = i % self.registry.len();
            if n == 0 {
                timestamp_stale = true;
                self.drain_registrations();
                self.poll_control_channel();
                if self.registry.is_empty() {
                    continue;
                }
            }
            let n = i % self.registry.len();

            let span = self.registry[n].inner.ring.read_span();
            if span.is_empty() {
                if flush_countdown > 0 {
                    flush_countdown -= 1;
                    if flush_countdown == 0 {
                        if let Err(e) = self.output.flush() {
                            tracing::warn!(error = %e, "periodic flush failed");
                        }
                    }
                }
                i += 1;
                continue;
            }

            if timestamp_stale {
                timestamp_buf.clear();
                render_timestamp((self.clock)(), &mut timestamp_buf);
                // SAFETY-free: `render_timestamp` only ever writes ASCII.
                timestamp_text = String::from_utf8(timestamp_buf.clone()).unwrap_or_default();
                timestamp_stale = false;
            }

            let sink_name = self.registry[n].name();
            let ctx = RenderCtx { timestamp: &timestamp_text, sink_name: &sink_name };

            let mut destroy_flag = false;
            let begin = span.begin() as *const u8;
            let ring_end = self.registry[n].inner.ring.end_of_first_mapping() as *const u8;
            let span_end = unsafe { begin.add(span.len()) };
            let end = if span_end < ring_end { span_end } else { ring_end };

            let mut cursor = begin;
            loop {
                // SAFETY: `cursor` walks records written by `encode_record_n`/
                // `encode_record_s` on this exact sink's ring, never past the
                // readable span's end.
                cursor = unsafe { dispatch(&mut self.output, &mut destroy_flag, &ctx, cursor) };
                if cursor >= end {
                    break;
                }
            }

            if destroy_flag {
                self.registry.swap_remove(n);
                continue;
            }

            let consumed = cursor as usize - begin as usize;
            self.registry[n].inner.ring.reduce_readable(consumed);

            if self.registry[n].inner.ring.read_span().is_empty() {
                let dropped = self.registry[n].inner.ring.take_dropped_count();
                if dropped > 0 {
                    self.registry[n].dropped_total += dropped as u64;
                    let style = self.registry[n].inner.style;
                    self.output.render_line(|buf| {
                        buf.extend_from_slice(style(crate::level::LogLevel::Warning).as_bytes());
                        buf.extend_from_slice(ctx.timestamp.as_bytes());
                        buf.push(b' ');
                        buf.extend_from_slice(ctx.sink_name.as_bytes());
                        buf.push(b':');
                        buf.push(b' ');
                        buf.extend_from_slice(format!("{dropped} messages dropped").as_bytes());
                    });
                }
            }

            flush_countdown = self.registry.len() as u32;
            i += 1;
        }

        if let Err(e) = self.output.flush() {
            tracing::warn!(error = %e, "final flush on consumer shutdown failed");
        }
    }
}

/// Short-lived bridge between [`xtr_ctl::CommandHandler`] and the
/// consumer's own state, constructed via field destructuring so the
/// borrow checker sees `registry` and `output` as the disjoint field
/// borrows they are, rather than `Consumer` needing to implement the
/// trait directly (which would require borrowing `self.dispatcher` and
/// `self` mutably at the same time inside `run`).
struct ConsumerHandler<'a> {
    registry: &'a mut Vec<SinkHandle>,
    output: &'a mut OutputBuffer,
}

impl CommandHandler for ConsumerHandler<'_> {
    fn status(&mut self, pattern: &Pattern) -> Result<Vec<SinkInfo>, CtlError> {
        let matcher = xtr_ctl::make_matcher(pattern).map_err(CtlError::Matcher)?;
        let mut sinks = Vec::new();
        for handle in self.registry.iter() {
            let name = handle.name();
            if !matcher.is_match(&name) {
                continue;
            }
            let info = SinkInfo::new(
                handle.inner.level.load() as u8,
                handle.inner.ring.capacity() as u64,
                handle.inner.ring.used_bytes() as u64,
                handle.dropped_total,
                name,
            )
            .map_err(CtlError::Wire)?;
            sinks.push(info);
        }
        Ok(sinks)
    }

    fn set_level(&mut self, level: u8, pattern: &Pattern) -> Result<(), CtlError> {
        let level = crate::level::LogLevel::from_u8(level).ok_or(CtlError::InvalidLevel(level))?;
        let matcher = xtr_ctl::make_matcher(pattern).map_err(CtlError::Matcher)?;
        for handle in self.registry.iter() {
            if matcher.is_match(&handle.name()) {
                handle.inner.level.store(level);
            }
        }
        Ok(())
    }

    fn reopen(&mut self) -> Result<(), CtlError> {
        self.output.flush().map_err(|e| CtlError::Io(std::io::Error::other(e.to_string())))?;
        self.output.reopen().map_err(|e| CtlError::Io(std::io::Error::other(e.to_string())))?;
        Ok(())
    }
}
