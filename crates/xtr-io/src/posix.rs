use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::path::{Path, PathBuf};

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// A synchronous, blocking-write storage back-end, grounded in
/// `xtr::posix_fd_storage`: a single fixed-size scratch buffer, written out
/// with a short-write retry loop.
pub struct PosixStorage {
    file: File,
    reopen_path: Option<PathBuf>,
    buf: Vec<u8>,
}

impl PosixStorage {
    pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

    /// Opens (creating if necessary) the file at `path` for appending.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::create_with_capacity(path, Self::DEFAULT_BUFFER_CAPACITY)
    }

    /// As [`Self::create`], with an explicit scratch buffer size.
    pub fn create_with_capacity(path: impl AsRef<Path>, capacity: usize) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(StorageError::Write)?;
        Ok(Self::from_file(file, Some(path.to_path_buf()), capacity))
    }

    /// Wraps an existing file descriptor, duplicating it so the caller
    /// retains ownership of theirs (mirrors `fd_storage_base`'s `dup(2)`).
    pub fn from_raw_fd(fd: RawFd, reopen_path: Option<PathBuf>) -> Result<Self, StorageError> {
        // SAFETY: `dup` is always safe to call on a valid fd; we check its
        // return value below.
        let dup_fd = unsafe { libc::dup(fd) };
        if dup_fd == -1 {
            return Err(StorageError::Dup(std::io::Error::last_os_error()));
        }
        // SAFETY: `dup_fd` was just returned by a successful `dup(2)`.
        let file = unsafe { File::from_raw_fd(dup_fd) };
        Ok(Self::from_file(file, reopen_path, Self::DEFAULT_BUFFER_CAPACITY))
    }

    fn from_file(file: File, reopen_path: Option<PathBuf>, capacity: usize) -> Self {
        Self { file, reopen_path, buf: vec![0u8; capacity] }
    }
}

impl StorageBackend for PosixStorage {
    fn allocate_buffer(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn submit_buffer(&mut self, size: usize) -> Result<(), StorageError> {
        let mut remaining = &self.buf[..size];
        while !remaining.is_empty() {
            match self.file.write(remaining) {
                Ok(0) => {
                    return Err(StorageError::Write(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "write returned 0",
                    )));
                }
                Ok(n) => remaining = &remaining[n..],
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StorageError::Write(e)),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        // Writes above are unbuffered syscalls; nothing to flush.
        Ok(())
    }

    fn sync(&mut self) {
        if let Err(e) = self.file.sync_data() {
            tracing::warn!(error = %e, "fsync failed");
        }
    }

    fn reopen(&mut self) -> Result<(), StorageError> {
        let path = self.reopen_path.clone().ok_or(StorageError::NoReopenPath)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StorageError::Reopen { path, source })?;
        self.file = file;
        Ok(())
    }
}

impl AsRawFd for PosixStorage {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
