use std::path::PathBuf;

/// Errors produced by a [`crate::StorageBackend`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("write to log file failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("reopen of {path:?} failed: {source}")]
    Reopen { path: PathBuf, #[source] source: std::io::Error },

    #[error("no reopen path is associated with this sink")]
    NoReopenPath,

    #[error("fsync failed: {0}")]
    Sync(#[source] std::io::Error),

    #[error("duplicating file descriptor failed: {0}")]
    Dup(#[source] std::io::Error),

    #[error("buffer pool exhausted ({0} buffers in flight)")]
    PoolExhausted(usize),

    #[error("async storage worker panicked or was dropped")]
    WorkerGone,
}
