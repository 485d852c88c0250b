//! Error types for the control channel.

use std::path::PathBuf;

use crate::matcher::MatcherError;
use crate::wire::WireError;

#[derive(Debug, thiserror::Error)]
pub enum CtlError {
    #[error("failed to bind control socket at {path}: {source}")]
    Bind { path: PathBuf, source: std::io::Error },

    #[error("control channel i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Matcher(#[from] MatcherError),

    #[error("no usable directory for a default command path (checked $XDG_RUNTIME_DIR and /tmp)")]
    NoCommandPathDirectory,

    #[error("poll(2) failed: {0}")]
    Poll(std::io::Error),

    #[error("unknown log level {0}")]
    InvalidLevel(u8),
}
