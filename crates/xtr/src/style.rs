//! Per-level line-prefix styling (`spec.md` 4.6, 6).

use crate::level::LogLevel;

/// Produces the style text prepended to a rendered line for `level`.
pub type StyleFn = fn(LogLevel) -> &'static str;

/// The default style: a single letter plus a trailing space, matching the
/// original library's terminal-friendly prefixes.
pub fn default_log_level_style(level: LogLevel) -> &'static str {
    match level {
        LogLevel::None => "",
        LogLevel::Fatal => "F ",
        LogLevel::Error => "E ",
        LogLevel::Warning => "W ",
        LogLevel::Info => "I ",
        LogLevel::Debug => "D ",
    }
}

/// A style using systemd/journald priority prefixes (`man sd-daemon`), for
/// sinks whose output is consumed by journald.
pub fn systemd_log_level_style(level: LogLevel) -> &'static str {
    match level {
        LogLevel::None => "",
        LogLevel::Fatal => "<0>",
        LogLevel::Error => "<3>",
        LogLevel::Warning => "<4>",
        LogLevel::Info => "<6>",
        LogLevel::Debug => "<7>",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_style_uses_letter_prefixes() {
        assert_eq!(default_log_level_style(LogLevel::Error), "E ");
        assert_eq!(default_log_level_style(LogLevel::Debug), "D ");
    }

    #[test]
    fn systemd_style_uses_priority_numbers() {
        assert_eq!(systemd_log_level_style(LogLevel::Fatal), "<0>");
        assert_eq!(systemd_log_level_style(LogLevel::Info), "<6>");
    }
}
