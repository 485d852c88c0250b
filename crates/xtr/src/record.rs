//! Record encoding and trampoline dispatch (`spec.md` 4.3, 4.5).
//!
//! Every log call places a small header plus a type-erased closure into its
//! sink's ring buffer. The header is a single function pointer — the
//! "trampoline" — obtained by monomorphizing a generic function over the
//! call's closure type `F`. Each distinct call site therefore produces its
//! own trampoline address, which doubles as the record's format identity:
//! the consumer never needs a separate tag or vtable, it just calls through
//! the pointer it finds at the front of the record.
//!
//! The original library distinguishes three physical record shapes (no
//! payload, fixed-size payload, payload with a trailing string table). Here
//! shape 0 and shape N share one encoding path: a zero-capture closure is a
//! zero-sized type, so the "no payload" case falls out of the general path
//! for free rather than needing its own trampoline. Shape S (string table)
//! remains genuinely distinct, since it has a different physical layout
//! (an extra length field, and bytes following the closure that aren't part
//! of `F` itself).

use std::mem::{align_of, size_of};

use xtr_ring::{RingBuffer, WriteTag};

use crate::output_buffer::OutputBuffer;

#[inline]
fn align_up(x: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (x + align - 1) & !(align - 1)
}

const WORD: usize = size_of::<usize>();
const WORD_ALIGN: usize = align_of::<usize>();

/// Outcome of attempting to encode a record under a given [`WriteTag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeOutcome {
    Written,
    /// Refused for lack of space under [`WriteTag::NonBlocking`]; the ring
    /// has already counted this in its dropped-record counter.
    Dropped,
}

/// Per-round state every record's closure renders against: a timestamp
/// text cached once per consumer scheduling round, and the sink's current
/// name (`spec.md` 4.8's `timestamp_stale` refresh).
pub struct RenderCtx<'a> {
    pub timestamp: &'a str,
    pub sink_name: &'a str,
}

/// A string captured into a shape-S record's string table, or a marker that
/// it had to be truncated for lack of room (`spec.md` 4.5).
#[derive(Debug, Clone, Copy)]
pub struct CapturedStr {
    offset: u32,
    len: u32,
}

const TRUNCATED: &str = "<truncated>";

impl CapturedStr {
    fn present(offset: usize, len: usize) -> Self {
        Self { offset: offset as u32, len: len as u32 }
    }

    fn truncated() -> Self {
        Self { offset: u32::MAX, len: 0 }
    }

    /// Resolves this capture against `table_base`, the pointer to the byte
    /// immediately following the record's closure.
    ///
    /// # Safety
    /// `table_base` must point at the string table written for this exact
    /// record by [`encode_record_s`].
    pub unsafe fn resolve<'a>(&self, table_base: *const u8) -> &'a str {
        if self.offset == u32::MAX {
            return TRUNCATED;
        }
        // SAFETY: `offset`/`len` were computed by `place_strings` against
        // this same table and are always in-bounds of the bytes it wrote.
        let bytes = unsafe {
            std::slice::from_raw_parts(table_base.add(self.offset as usize), self.len as usize)
        };
        std::str::from_utf8(bytes).unwrap_or("<invalid utf-8>")
    }
}

/// Encodes a record whose rendering needs no string table: a plain log
/// line (closure ignores `destroy_flag`), a close marker (sets it), or a
/// sync marker (flushes and notifies).
///
/// `closure` is called exactly once, by the consumer, with the output
/// buffer it should render into and a flag it may set to mark the sink for
/// destruction.
pub fn encode_record_n<F>(ring: &RingBuffer, tag: WriteTag, closure: F) -> EncodeOutcome
where
    F: FnOnce(&mut OutputBuffer, &mut bool, &RenderCtx) + Send + 'static,
{
    let closure_offset = align_up(WORD, align_of::<F>());
    let total = align_up(closure_offset + size_of::<F>(), WORD_ALIGN);

    let span = ring.write_span(total, tag);
    if span.len() < total {
        return EncodeOutcome::Dropped;
    }

    let base = span.begin();
    // SAFETY: `base` is valid for `total` bytes per `write_span`'s contract,
    // `base` is word-aligned (the ring's region is page-aligned), and no
    // other writer can alias this span.
    unsafe {
        base.cast::<usize>().write_unaligned(trampoline_n::<F> as usize);
        base.add(closure_offset).cast::<F>().write(closure);
    }
    ring.reduce_writable(total);
    EncodeOutcome::Written
}

/// Trampoline body shared by every shape-0/shape-N closure type `F`.
///
/// # Safety
/// `cursor` must point at a record written by [`encode_record_n::<F>`] with
/// this exact `F`.
unsafe fn trampoline_n<F>(
    out: &mut OutputBuffer,
    destroy_flag: &mut bool,
    ctx: &RenderCtx,
    cursor: *const u8,
) -> *const u8
where
    F: FnOnce(&mut OutputBuffer, &mut bool, &RenderCtx) + Send + 'static,
{
    let closure_offset = align_up(WORD, align_of::<F>());
    let total = align_up(closure_offset + size_of::<F>(), WORD_ALIGN);
    // SAFETY: see function contract; `ptr::read` takes ownership of the
    // closure's bits, so when it's invoked below and drops at the end of
    // this scope, its captures are destroyed exactly once, without needing
    // a separate `drop_in_place` on the ring's copy.
    let closure: F = unsafe { cursor.add(closure_offset).cast::<F>().read() };
    closure(out, destroy_flag, ctx);
    // SAFETY: see function contract.
    unsafe { cursor.add(total) }
}

/// Encodes a record with a trailing string table: each element of
/// `strings` is copied in order, and `build` receives the resulting
/// [`CapturedStr`] handles (in the same order) to build the closure that
/// will later resolve them against the table.
///
/// If the ring can't make room for every string (because it's momentarily
/// full under [`WriteTag::NonBlocking`], or because the full record could
/// never fit in the buffer regardless of tag), trailing strings are
/// replaced with a `<truncated>` marker rather than the whole record being
/// dropped.
pub fn encode_record_s<F>(
    ring: &RingBuffer,
    tag: WriteTag,
    strings: &[&str],
    build: impl FnOnce(&[CapturedStr]) -> F,
) -> EncodeOutcome
where
    F: FnOnce(&mut OutputBuffer, &mut bool, &RenderCtx, *const u8) + Send + 'static,
{
    // Header: trampoline pointer, then a word-sized record length.
    let len_offset = WORD;
    let closure_offset = align_up(len_offset + WORD, align_of::<F>());
    let closure_end = closure_offset + size_of::<F>();
    let capacity = ring.capacity();
    debug_assert!(closure_end <= capacity, "a record's fixed header+closure must fit the ring");

    let full_strings_len: usize = strings.iter().map(|s| s.len()).sum();
    let best_case_total = align_up(closure_end + full_strings_len, WORD_ALIGN);

    // Ask for everything first. Only fall back to a truncating, best-effort
    // span when that fails — which for `Blocking` never happens, and for
    // `NonBlocking` only happens when the ring is momentarily too full or
    // structurally could never hold every string at once.
    let (span, budget) = if best_case_total <= capacity {
        let span = ring.write_span(best_case_total, tag);
        if span.len() >= best_case_total {
            (span, full_strings_len)
        } else {
            let minimal = align_up(closure_end, WORD_ALIGN);
            let span = ring.write_span(minimal, WriteTag::NonBlocking);
            if span.len() < minimal {
                return EncodeOutcome::Dropped;
            }
            let budget = span.len() - closure_end;
            (span, budget)
        }
    } else {
        let minimal = align_up(closure_end, WORD_ALIGN);
        let span = ring.write_span(minimal, tag);
        if span.len() < minimal {
            return EncodeOutcome::Dropped;
        }
        let budget = span.len() - closure_end;
        (span, budget)
    };

    // Within `budget`, decide how many whole strings fit; partial strings
    // are never split, the first one that doesn't fit (and everything
    // after it) is truncated instead.
    let mut captures = Vec::with_capacity(strings.len());
    let mut used = 0usize;
    let mut truncating = false;
    for s in strings {
        if !truncating && used + s.len() <= budget {
            captures.push(CapturedStr::present(0, s.len()));
            used += s.len();
        } else {
            truncating = true;
            captures.push(CapturedStr::truncated());
        }
    }

    let total = align_up(closure_end + used, WORD_ALIGN);
    debug_assert!(total <= span.len());

    let base = span.begin();
    let table_base_offset = closure_end;
    let mut write_cursor = table_base_offset;
    for (capture, s) in captures.iter_mut().zip(strings.iter()) {
        if capture.offset == u32::MAX {
            continue;
        }
        let offset_from_table = write_cursor - table_base_offset;
        // SAFETY: `write_cursor + s.len() <= total <= span.len()`.
        unsafe {
            std::ptr::copy_nonoverlapping(s.as_ptr(), base.add(write_cursor), s.len());
        }
        *capture = CapturedStr::present(offset_from_table, s.len());
        write_cursor += s.len();
    }

    let closure = build(&captures);
    debug_assert_eq!(size_of::<F>(), closure_end - closure_offset);

    // SAFETY: `base` is valid for `total` bytes, word-aligned, and `F`'s
    // slot was sized and aligned for exactly this write above.
    unsafe {
        base.cast::<usize>().write_unaligned(trampoline_s::<F> as usize);
        base.add(len_offset).cast::<usize>().write_unaligned(total);
        base.add(closure_offset).cast::<F>().write(closure);
    }
    ring.reduce_writable(total);
    EncodeOutcome::Written
}

/// # Safety
/// `cursor` must point at a record written by [`encode_record_s::<F>`] with
/// this exact `F`.
unsafe fn trampoline_s<F>(
    out: &mut OutputBuffer,
    destroy_flag: &mut bool,
    ctx: &RenderCtx,
    cursor: *const u8,
) -> *const u8
where
    F: FnOnce(&mut OutputBuffer, &mut bool, &RenderCtx, *const u8) + Send + 'static,
{
    let len_offset = WORD;
    let closure_offset = align_up(len_offset + WORD, align_of::<F>());
    // SAFETY: see function contract.
    let total = unsafe { cursor.add(len_offset).cast::<usize>().read_unaligned() };
    let closure: F = unsafe { cursor.add(closure_offset).cast::<F>().read() };
    let table_base = unsafe { cursor.add(closure_offset + size_of::<F>()) };
    closure(out, destroy_flag, ctx, table_base);
    unsafe { cursor.add(total) }
}

/// The type-erased entry point stored at the front of every record. Built
/// by casting a monomorphized `trampoline_n::<F>`/`trampoline_s::<F>` to
/// this signature; the cast is sound because all instantiations share the
/// same calling convention and argument/return types.
pub type Trampoline = unsafe fn(&mut OutputBuffer, &mut bool, &RenderCtx, *const u8) -> *const u8;

/// Reads the trampoline pointer at the front of a record and calls through
/// it, returning the cursor for the next record.
///
/// # Safety
/// `cursor` must point at the start of a record written by
/// [`encode_record_n`] or [`encode_record_s`].
pub unsafe fn dispatch(
    out: &mut OutputBuffer,
    destroy_flag: &mut bool,
    ctx: &RenderCtx,
    cursor: *const u8,
) -> *const u8 {
    // SAFETY: every record begins with a word-sized trampoline pointer
    // written by `encode_record_n`/`encode_record_s`.
    let trampoline = unsafe { cursor.cast::<usize>().read_unaligned() };
    // SAFETY: function-pointer-as-usize round trip of a value that was
    // itself produced by casting a `Trampoline`-shaped fn item.
    let trampoline: Trampoline = unsafe { std::mem::transmute(trampoline) };
    // SAFETY: `cursor` points at a record written with the `F` this
    // trampoline was monomorphized for.
    unsafe { trampoline(out, destroy_flag, ctx, cursor) }
}
