//! Lock-free single-producer/single-consumer byte ring buffer built on a
//! double-mapped ("mirrored") virtual memory region.
//!
//! This crate implements only the mechanical plumbing: memory mapping
//! ([`mirror`]), the ring buffer protocol itself ([`ring`]), and small
//! shared helpers ([`backoff`], [`pagesize`]). It knows nothing about log
//! records, formatting, or sinks — those live in the `xtr` crate, which is
//! built on top of [`RingBuffer`].

mod backoff;
mod invariants;
mod mirror;
mod pagesize;
mod ring;

pub use backoff::Backoff;
pub use mirror::{MirrorError, MirroredRegion};
pub use pagesize::{align_to_page_size, page_size};
pub use ring::{RingBuffer, Span, WriteTag};
