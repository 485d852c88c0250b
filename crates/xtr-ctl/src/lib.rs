//! Control channel wire protocol and Unix socket dispatcher.
//!
//! A running logger can optionally bind a [`dispatcher::CommandDispatcher`]
//! to a Unix domain socket, letting the `xtrctl` CLI (or any client sending
//! the same frames) query sink status, change log levels, and request a
//! storage reopen — all filtered by a glob or POSIX regex sink-name
//! [`wire::Pattern`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use xtr_ctl::dispatcher::{CommandDispatcher, CommandHandler};
//! use xtr_ctl::error::CtlError;
//! use xtr_ctl::wire::{Pattern, SinkInfo};
//!
//! struct NoopHandler;
//!
//! impl CommandHandler for NoopHandler {
//!     fn status(&mut self, _pattern: &Pattern) -> Result<Vec<SinkInfo>, CtlError> {
//!         Ok(Vec::new())
//!     }
//!     fn set_level(&mut self, _level: u8, _pattern: &Pattern) -> Result<(), CtlError> {
//!         Ok(())
//!     }
//!     fn reopen(&mut self) -> Result<(), CtlError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut dispatcher = CommandDispatcher::bind(xtr_ctl::socket_path::default_command_path())?;
//! dispatcher.process_commands(Duration::from_millis(0), &mut NoopHandler)?;
//! # Ok::<(), CtlError>(())
//! ```

pub mod dispatcher;
pub mod error;
pub(crate) mod invariants;
pub mod matcher;
pub mod socket_path;
pub mod wire;

pub use dispatcher::{CommandDispatcher, CommandHandler};
pub use error::CtlError;
pub use matcher::{make_matcher, MatcherError, SinkMatcher};
pub use socket_path::{default_command_path, NULL_COMMAND_PATH};
pub use wire::{Pattern, PatternKind, Request, Response, SinkInfo, WireError};
