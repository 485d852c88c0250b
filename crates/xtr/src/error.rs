use xtr_ctl::{CtlError, WireError};
use xtr_io::StorageError;
use xtr_ring::MirrorError;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("failed to create sink's ring buffer: {0}")]
    Ring(#[from] MirrorError),

    #[error("storage back-end error: {0}")]
    Storage(#[from] StorageError),

    #[error("control channel error: {0}")]
    Control(#[from] CtlError),

    #[error("control channel wire error: {0}")]
    Wire(#[from] WireError),

    #[error("sink name {0:?} exceeds the control channel's name length limit")]
    NameTooLong(String),

    #[error("unknown log level {0}")]
    InvalidLevel(u8),

    #[error("the consumer thread exited before this request could be serviced")]
    ConsumerGone,
}
