use crate::error::StorageError;

/// Path used to signal "this sink has no associated file and cannot be
/// reopened", mirroring `xtr::null_reopen_path` in the original storage
/// interface.
pub const NULL_REOPEN_PATH: &str = "";

/// A pluggable output destination for a consumer thread's rendered log
/// records.
///
/// Implementations are driven exclusively by the single consumer thread
/// that owns the sink's output buffer (`spec.md` 4.7), so none of these
/// methods need to be `Send`/`Sync` themselves; the trait object as a whole
/// is moved into the consumer once at sink-registration time.
pub trait StorageBackend {
    /// Returns a buffer the caller may fill with rendered bytes before
    /// calling [`submit_buffer`](StorageBackend::submit_buffer). The
    /// returned slice's lifetime is tied to `&mut self` so an
    /// implementation may hand out a view into pool storage it owns.
    fn allocate_buffer(&mut self) -> &mut [u8];

    /// Submits the first `size` bytes of a buffer previously returned from
    /// `allocate_buffer` for writing.
    fn submit_buffer(&mut self, size: usize) -> Result<(), StorageError>;

    /// Blocks until all previously submitted buffers have been written out.
    fn flush(&mut self) -> Result<(), StorageError>;

    /// Requests the underlying storage durably persist written data
    /// (`fsync` for file-backed storage). Best-effort: errors are logged by
    /// the caller rather than propagated, matching the `noexcept` contract
    /// of the original interface.
    fn sync(&mut self);

    /// Closes and reopens the underlying file at its original path, used to
    /// support external log rotation via the xtrctl `reopen` command.
    fn reopen(&mut self) -> Result<(), StorageError>;
}
