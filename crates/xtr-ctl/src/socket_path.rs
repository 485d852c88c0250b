//! Default command socket path selection.
//!
//! Grounded in `xtr::default_command_path()`: a string of the form
//! `/run/user/<uid>/xtrctl.<pid>.<N>`, where `N` starts at zero and
//! increases on each call, falling back to `/tmp` if the
//! `/run/user/<uid>` directory does not exist or is inaccessible.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

/// Passed to [`crate::dispatcher::CommandDispatcher::bind`] to mean "no
/// command socket", mirroring `xtr::null_command_path`.
pub const NULL_COMMAND_PATH: &str = "";

static CTL_COUNT: AtomicU32 = AtomicU32::new(0);

/// Returns the default command path, incrementing an internal counter each
/// call so that multiple loggers in the same process get distinct paths.
pub fn default_command_path() -> PathBuf {
    let n = CTL_COUNT.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    // SAFETY: `geteuid` has no preconditions and never fails.
    let uid = unsafe { libc::geteuid() };

    let run_dir = PathBuf::from(format!("/run/user/{uid}"));
    let base = if run_dir.is_dir() { run_dir } else { PathBuf::from("/tmp") };
    base.join(format!("xtrctl.{pid}.{n}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successive_calls_get_distinct_counters() {
        let a = default_command_path();
        let b = default_command_path();
        assert_ne!(a, b);
    }

    #[test]
    fn path_is_rooted_under_run_or_tmp() {
        let path = default_command_path();
        let s = path.to_string_lossy();
        assert!(s.starts_with("/run/user/") || s.starts_with("/tmp/"));
    }
}
