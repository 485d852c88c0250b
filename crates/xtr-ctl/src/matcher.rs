//! Sink-name matchers, selected by a request's [`Pattern`](crate::wire::Pattern).
//!
//! Grounded in `xtr::detail::matcher` / `regex_matcher` / `make_matcher`: the
//! original deliberately avoids `std::regex` because it cannot be used
//! without exceptions, reaching for POSIX `<regex.h>` instead. The same
//! reasoning carries over here — `regcomp`/`regexec` via `libc` give exact
//! POSIX basic/extended regex semantics without pulling in a second regex
//! engine with its own (incompatible) dialect.

use std::ffi::CString;
use std::fmt;

use crate::wire::{Pattern, PatternKind};

pub trait SinkMatcher: fmt::Debug {
    fn is_match(&self, name: &str) -> bool;
}

#[derive(Debug)]
struct MatchAll;

impl SinkMatcher for MatchAll {
    fn is_match(&self, _name: &str) -> bool {
        true
    }
}

/// Shell-style glob matcher supporting `*` and `?`, mirroring
/// `xtr::detail::wildcard_matcher`.
#[derive(Debug)]
struct GlobMatcher {
    pattern: Vec<char>,
    ignore_case: bool,
}

impl GlobMatcher {
    fn new(pattern: &str, ignore_case: bool) -> Self {
        let pattern = if ignore_case {
            pattern.to_lowercase().chars().collect()
        } else {
            pattern.chars().collect()
        };
        Self { pattern, ignore_case }
    }

    fn matches(&self, name: &str) -> bool {
        let name: Vec<char> = if self.ignore_case {
            name.to_lowercase().chars().collect()
        } else {
            name.chars().collect()
        };
        glob_match(&self.pattern, &name)
    }
}

fn glob_match(pattern: &[char], name: &[char]) -> bool {
    match (pattern.first(), name.first()) {
        (None, None) => true,
        (Some('*'), _) => {
            glob_match(&pattern[1..], name) || (!name.is_empty() && glob_match(pattern, &name[1..]))
        }
        (Some('?'), Some(_)) => glob_match(&pattern[1..], &name[1..]),
        (Some(p), Some(n)) if p == n => glob_match(&pattern[1..], &name[1..]),
        _ => false,
    }
}

impl SinkMatcher for GlobMatcher {
    fn is_match(&self, name: &str) -> bool {
        self.matches(name)
    }
}

/// POSIX regular expression matcher (basic or extended), wrapping
/// `regcomp`/`regexec`/`regfree` exactly as `xtr::detail::regex_matcher`
/// wraps `<regex.h>`.
struct RegexMatcher {
    regex: libc::regex_t,
}

impl fmt::Debug for RegexMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexMatcher").finish_non_exhaustive()
    }
}

impl RegexMatcher {
    fn new(pattern: &str, ignore_case: bool, extended: bool) -> Result<Self, MatcherError> {
        let c_pattern = CString::new(pattern).map_err(|_| MatcherError::InteriorNul)?;
        let flags = libc::REG_NOSUB
            | if ignore_case { libc::REG_ICASE } else { 0 }
            | if extended { libc::REG_EXTENDED } else { 0 };

        // SAFETY: `regex` is zeroed and only read by `regcomp`/`regexec`/
        // `regfree` after a successful `regcomp` call below.
        let mut regex: libc::regex_t = unsafe { std::mem::zeroed() };
        // SAFETY: `c_pattern` is a valid NUL-terminated C string and
        // `regex` is valid, uninitialized storage `regcomp` is documented
        // to fill in.
        let errnum = unsafe { libc::regcomp(&mut regex, c_pattern.as_ptr(), flags) };
        if errnum != 0 {
            // SAFETY: `regex` was just populated (even on error) by regcomp.
            let reason = unsafe { regerror_to_string(errnum, &regex) };
            // A regex that failed to compile has nothing for regfree to
            // release.
            return Err(MatcherError::InvalidPattern(reason));
        }
        Ok(Self { regex })
    }
}

impl Drop for RegexMatcher {
    fn drop(&mut self) {
        // SAFETY: `self.regex` was successfully compiled by `regcomp` in
        // `new` and is only freed once.
        unsafe { libc::regfree(&mut self.regex) };
    }
}

impl SinkMatcher for RegexMatcher {
    fn is_match(&self, name: &str) -> bool {
        let Ok(c_name) = CString::new(name) else { return false };
        // SAFETY: `self.regex` is a compiled regex valid for the lifetime
        // of `self`, and `c_name` is a valid NUL-terminated C string.
        let result = unsafe {
            libc::regexec(&self.regex, c_name.as_ptr(), 0, std::ptr::null_mut(), 0)
        };
        result == 0
    }
}

unsafe fn regerror_to_string(errnum: libc::c_int, regex: &libc::regex_t) -> String {
    let mut buf = [0u8; 256];
    let len = libc::regerror(errnum, regex as *const libc::regex_t, buf.as_mut_ptr().cast(), buf.len());
    let len = len.min(buf.len());
    String::from_utf8_lossy(&buf[..len.saturating_sub(1)]).into_owned()
}

#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("pattern contains an interior NUL byte")]
    InteriorNul,
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

/// Builds the matcher selected by `pattern`, mirroring
/// `xtr::detail::make_matcher`'s dispatch on `pattern_type_t`.
pub fn make_matcher(pattern: &Pattern) -> Result<Box<dyn SinkMatcher>, MatcherError> {
    match pattern.kind {
        PatternKind::None => Ok(Box::new(MatchAll)),
        PatternKind::Wildcard => Ok(Box::new(GlobMatcher::new(&pattern.text, pattern.ignore_case))),
        PatternKind::ExtendedRegex => {
            Ok(Box::new(RegexMatcher::new(&pattern.text, pattern.ignore_case, true)?))
        }
        PatternKind::BasicRegex => {
            Ok(Box::new(RegexMatcher::new(&pattern.text, pattern.ignore_case, false)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(kind: PatternKind, text: &str) -> Pattern {
        Pattern::new(kind, false, text).unwrap()
    }

    #[test]
    fn none_matches_everything() {
        let m = make_matcher(&pattern(PatternKind::None, "")).unwrap();
        assert!(m.is_match("anything"));
    }

    #[test]
    fn wildcard_matches_prefix_and_suffix() {
        let m = make_matcher(&pattern(PatternKind::Wildcard, "worker-*")).unwrap();
        assert!(m.is_match("worker-1"));
        assert!(!m.is_match("consumer-1"));
    }

    #[test]
    fn wildcard_single_char_wildcard() {
        let m = make_matcher(&pattern(PatternKind::Wildcard, "sink-?")).unwrap();
        assert!(m.is_match("sink-1"));
        assert!(!m.is_match("sink-12"));
    }

    #[test]
    fn extended_regex_matches_alternation() {
        let m = make_matcher(&pattern(PatternKind::ExtendedRegex, "^(foo|bar)$")).unwrap();
        assert!(m.is_match("foo"));
        assert!(m.is_match("bar"));
        assert!(!m.is_match("baz"));
    }

    #[test]
    fn basic_regex_treats_plus_literally() {
        // In a BRE, `+` has no special meaning unlike in an ERE.
        let m = make_matcher(&pattern(PatternKind::BasicRegex, "a+b")).unwrap();
        assert!(m.is_match("a+b"));
        assert!(!m.is_match("aab"));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = RegexMatcher::new("(unclosed", false, true);
        assert!(err.is_err());
    }

    #[test]
    fn ignore_case_applies_to_wildcard_and_regex() {
        let m = make_matcher(&pattern(PatternKind::Wildcard, "WORKER-*")).unwrap();
        assert!(!m.is_match("worker-1"));
        let ci = Pattern::new(PatternKind::Wildcard, true, "WORKER-*").unwrap();
        let m = make_matcher(&ci).unwrap();
        assert!(m.is_match("worker-1"));
    }
}
