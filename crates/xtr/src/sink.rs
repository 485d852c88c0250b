//! The producer-facing handle for a single named log destination
//! (`spec.md` 4.4).

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use xtr_ring::{MirrorError, RingBuffer, WriteTag};

use crate::consumer::ConsumerCommand;
use crate::level::{AtomicLevel, LogLevel};
use crate::output_buffer::OutputBuffer;
use crate::record::{encode_record_n, encode_record_s, CapturedStr, EncodeOutcome, RenderCtx};
use crate::style::{default_log_level_style, StyleFn};

/// Shared, consumer-visible state for one sink: its ring buffer, level,
/// current name, and the style function used to prefix every rendered
/// line. The consumer keeps a non-owning [`crate::consumer::SinkHandle`]
/// wrapping the same `Arc`; neither side's lifetime depends on the other
/// continuing to exist, since the ring itself has no destructor-order
/// requirement.
pub(crate) struct SinkInner {
    pub(crate) ring: RingBuffer,
    pub(crate) level: AtomicLevel,
    pub(crate) style: StyleFn,
    pub(crate) name: Mutex<String>,
}

/// A handle for posting log records to one named destination.
///
/// Cloning/moving a `Sink` across threads is safe, but `log`/`sync`/
/// `close` must only ever be called from the single thread that currently
/// owns it — the ring buffer underneath is single-producer. `set_level`/
/// `level`/`set_name` may be called from any thread at any time.
pub struct Sink {
    pub(crate) inner: Arc<SinkInner>,
    pub(crate) command_tx: mpsc::Sender<ConsumerCommand>,
    pub(crate) ring_capacity: usize,
}

impl Sink {
    pub(crate) fn from_parts(
        inner: Arc<SinkInner>,
        command_tx: mpsc::Sender<ConsumerCommand>,
        ring_capacity: usize,
    ) -> Self {
        Self { inner, command_tx, ring_capacity }
    }

    pub fn name(&self) -> String {
        self.inner.name.lock().unwrap().clone()
    }

    /// Updates this sink's name. The consumer picks up the new name the
    /// next time it services this sink's ring, since every record's
    /// render context is built from the current name rather than one
    /// cached at log-call time (`spec.md` 4.4's `set_name`).
    pub fn set_name(&self, name: impl Into<String>) {
        *self.inner.name.lock().unwrap() = name.into();
    }

    pub fn level(&self) -> LogLevel {
        self.inner.level.load()
    }

    pub fn set_level(&self, level: LogLevel) {
        self.inner.level.store(level);
    }

    /// Returns `true` when a call at `level` would actually be recorded,
    /// letting a caller skip expensive argument formatting entirely.
    pub fn is_open(&self, level: LogLevel) -> bool {
        self.level() >= level
    }

    /// Encodes a record with no arguments. `location` is typically
    /// `concat!(file!(), ":", line!())` from the call site. Logging at
    /// [`LogLevel::Fatal`] syncs the sink and aborts the process once the
    /// record has been encoded (`spec.md` 4.4).
    pub fn log(&self, tag: WriteTag, level: LogLevel, location: &'static str, message: &'static str) {
        if !self.is_open(level) {
            return;
        }
        let style = self.inner.style;
        encode_record_n(&self.inner.ring, tag, move |out: &mut OutputBuffer, _destroy, ctx: &RenderCtx| {
            out.render_line(|buf| {
                write_preamble(buf, style, level, ctx, location);
                escape_into(buf, message.as_bytes());
            });
        });
        self.abort_if_fatal(level);
    }

    /// Encodes a record whose closure has already captured all of its
    /// arguments by value; `render` is invoked on the consumer thread to
    /// produce the line's text after the shared style/timestamp/sink-name
    /// preamble.
    pub fn log_with<F>(&self, tag: WriteTag, level: LogLevel, location: &'static str, render: F)
    where
        F: FnOnce(&mut Vec<u8>) + Send + 'static,
    {
        if !self.is_open(level) {
            return;
        }
        let style = self.inner.style;
        encode_record_n(&self.inner.ring, tag, move |out: &mut OutputBuffer, _destroy, ctx: &RenderCtx| {
            out.render_line(|buf| {
                write_preamble(buf, style, level, ctx, location);
                render(buf);
            });
        });
        self.abort_if_fatal(level);
    }

    /// Encodes a record whose string-typed arguments are captured by
    /// reference into a trailing string table rather than cloned into the
    /// closure, per the by-reference string capture policy (`spec.md`
    /// 4.3). `strings` is copied into the ring; `render` reconstructs the
    /// line once the consumer resolves each [`CapturedStr`] back to a
    /// `&str`.
    pub fn log_with_strings<F>(
        &self,
        tag: WriteTag,
        level: LogLevel,
        location: &'static str,
        strings: &[&str],
        render: F,
    ) where
        F: FnOnce(&[&str], &mut Vec<u8>) + Send + 'static,
    {
        if !self.is_open(level) {
            return;
        }
        let style = self.inner.style;
        let outcome = encode_record_s(&self.inner.ring, tag, strings, move |captures: &[CapturedStr]| {
            let captures = captures.to_vec();
            move |out: &mut OutputBuffer, _destroy: &mut bool, ctx: &RenderCtx, table: *const u8| {
                // SAFETY: `table` is the string table written for this
                // exact record by `encode_record_s`.
                let resolved: Vec<&str> = captures.iter().map(|c| unsafe { c.resolve(table) }).collect();
                out.render_line(|buf| {
                    write_preamble(buf, style, level, ctx, location);
                    render(&resolved, buf);
                });
            }
        });
        let _ = outcome;
        self.abort_if_fatal(level);
    }

    fn abort_if_fatal(&self, level: LogLevel) {
        if level == LogLevel::Fatal {
            self.sync();
            std::process::abort();
        }
    }

    /// Enqueues a marker that asks the consumer to flush and `fsync` this
    /// sink's storage once every record preceding it has been rendered,
    /// then blocks until that has happened.
    pub fn sync(&self) {
        let (tx, rx) = mpsc::channel::<()>();
        encode_record_n(&self.inner.ring, WriteTag::Blocking, move |out: &mut OutputBuffer, _destroy, _ctx| {
            if let Err(e) = out.flush() {
                tracing::warn!(error = %e, "flush failed during sync");
            }
            out.sync();
            let _ = tx.send(());
        });
        let _ = rx.recv();
    }

    /// Enqueues a marker that asks the consumer to drop this sink from its
    /// registry once every record preceding it has been rendered.
    pub fn close(&self) {
        encode_record_n(&self.inner.ring, WriteTag::Blocking, |_out: &mut OutputBuffer, destroy: &mut bool, _ctx| {
            *destroy = true;
        });
    }

    /// Creates a brand-new sink with the same name and level, registered
    /// independently with the consumer (`spec.md` 4.4's `try_clone`, which
    /// the original models on `dup(2)` rather than sharing one ring).
    pub fn try_clone(&self) -> Result<Sink, MirrorError> {
        let ring = RingBuffer::new(self.ring_capacity)?;
        let inner = Arc::new(SinkInner {
            ring,
            level: AtomicLevel::new(self.level()),
            style: self.inner.style,
            name: Mutex::new(self.name()),
        });
        let handle = crate::consumer::SinkHandle::new(inner.clone());
        let _ = self.command_tx.send(ConsumerCommand::Register(handle));
        Ok(Sink { inner, command_tx: self.command_tx.clone(), ring_capacity: self.ring_capacity })
    }
}

impl Drop for Sink {
    /// Closes this sink automatically, so a logger whose sinks have all
    /// gone out of scope still satisfies `spec.md` 4.9's "the background
    /// thread exits once every sink has closed" without every caller
    /// needing to remember an explicit `close()` call.
    fn drop(&mut self) {
        self.close();
    }
}

/// Writes `<style><timestamp> <sink-name> <location>: ` ahead of a line's
/// user-formatted text (`spec.md` 6).
fn write_preamble(buf: &mut Vec<u8>, style: StyleFn, level: LogLevel, ctx: &RenderCtx, location: &str) {
    buf.extend_from_slice(style(level).as_bytes());
    buf.extend_from_slice(ctx.timestamp.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(ctx.sink_name.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(location.as_bytes());
    buf.push(b':');
    buf.push(b' ');
}

pub(crate) const DEFAULT_STYLE: StyleFn = default_log_level_style;

/// Escapes bytes outside `0x20..=0x7E` (other than the escape character
/// itself) as `\xHH`, per the unprintable-character policy (`spec.md`
/// 4.6).
pub fn escape_into(out: &mut Vec<u8>, bytes: &[u8]) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for &b in bytes {
        if b == b'\\' {
            out.push(b'\\');
            out.push(b'\\');
        } else if (0x20..=0x7E).contains(&b) {
            out.push(b);
        } else {
            out.push(b'\\');
            out.push(b'x');
            out.push(HEX[(b >> 4) as usize]);
            out.push(HEX[(b & 0xF) as usize]);
        }
    }
}
