//! Pluggable storage back-ends for rendered log output.
//!
//! A [`StorageBackend`] is the seam between the consumer scheduler (in the
//! `xtr` crate) and wherever bytes ultimately land: a plain file
//! ([`PosixStorage`]) or a batched, asynchronously-completed sink
//! ([`IoUringStorage`]).

mod backend;
mod error;
mod io_uring;
mod posix;

pub use backend::{StorageBackend, NULL_REOPEN_PATH};
pub use error::StorageError;
pub use io_uring::IoUringStorage;
pub use posix::PosixStorage;

use std::path::Path;

/// Opens `path` for appending and returns the default storage back-end for
/// the host platform, mirroring `xtr::make_fd_storage(const char*)`.
///
/// On Linux this is [`IoUringStorage`]; elsewhere it falls back to
/// [`PosixStorage`].
pub fn make_fd_storage(path: impl AsRef<Path>) -> Result<Box<dyn StorageBackend + Send>, StorageError> {
    make_fd_storage_with_capacity(path, PosixStorage::DEFAULT_BUFFER_CAPACITY)
}

/// As [`make_fd_storage`], with an explicit scratch/registered-buffer
/// capacity (`Config::io_buffer_capacity`).
pub fn make_fd_storage_with_capacity(
    path: impl AsRef<Path>,
    buffer_capacity: usize,
) -> Result<Box<dyn StorageBackend + Send>, StorageError> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(IoUringStorage::with_capacity(
            path,
            buffer_capacity,
            IoUringStorage::DEFAULT_QUEUE_SIZE,
            IoUringStorage::DEFAULT_BATCH_SIZE,
        )?))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Ok(Box::new(PosixStorage::create_with_capacity(path, buffer_capacity)?))
    }
}
