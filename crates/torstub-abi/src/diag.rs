//! Labeled diagnostics on stderr.
//!
//! Lines look like `torstub: WARN: <message>`. Each one is formatted into a
//! fixed stack buffer and handed to a single `write(2)`, so logging from
//! inside an interposed call never allocates and never takes the std stderr
//! lock. Overlong messages are cut at the buffer capacity.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Capacity of one diagnostic line, newline included.
pub const LINE_CAP: usize = 512;

const PREFIX: &str = "torstub: ";

static DEBUG: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Warn,
    Error,
}

impl Level {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Turn debug lines on or off; set once during bootstrap.
pub fn set_debug(on: bool) {
    DEBUG.store(on, Ordering::Relaxed);
}

#[must_use]
pub fn debug_enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

/// Fixed-capacity line buffer implementing [`fmt::Write`].
pub struct LineBuf {
    buf: [u8; LINE_CAP],
    len: usize,
    truncated: bool,
}

impl LineBuf {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0; LINE_CAP],
            len: 0,
            truncated: false,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Terminate the line; one byte is always kept free for this.
    fn finish(&mut self) {
        self.buf[self.len] = b'\n';
        self.len += 1;
    }
}

impl Default for LineBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = LINE_CAP - 1 - self.len;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() {
            self.truncated = true;
        }
        Ok(())
    }
}

/// Format a complete, newline-terminated diagnostic line.
#[must_use]
pub fn format_line(level: Level, args: fmt::Arguments<'_>) -> LineBuf {
    use fmt::Write as _;

    let mut line = LineBuf::new();
    let _ = line.write_str(PREFIX);
    let _ = line.write_str(level.label());
    let _ = line.write_str(": ");
    let _ = line.write_fmt(args);
    line.finish();
    line
}

/// Write a diagnostic line to stderr. Debug lines are dropped unless enabled.
pub fn emit(level: Level, args: fmt::Arguments<'_>) {
    if level == Level::Debug && !debug_enabled() {
        return;
    }
    let line = format_line(level, args);
    let bytes = line.as_bytes();
    // SAFETY: `bytes` is a live buffer of `bytes.len()` bytes.
    let _ = unsafe { libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len()) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_has_prefix_label_and_newline() {
        let line = format_line(Level::Warn, format_args!("query = {}", 22));
        assert_eq!(line.as_bytes(), b"torstub: WARN: query = 22\n");
        assert!(!line.is_truncated());
    }

    #[test]
    fn overlong_line_is_truncated_but_terminated() {
        let long = "x".repeat(LINE_CAP * 2);
        let line = format_line(Level::Error, format_args!("{long}"));
        assert_eq!(line.as_bytes().len(), LINE_CAP);
        assert_eq!(line.as_bytes()[LINE_CAP - 1], b'\n');
        assert!(line.is_truncated());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(LINE_CAP);
        let line = format_line(Level::Debug, format_args!("{long}"));
        let text = std::str::from_utf8(line.as_bytes()).unwrap();
        assert!(text.ends_with('\n'));
        assert!(line.is_truncated());
    }

    #[test]
    fn labels() {
        assert_eq!(Level::Debug.label(), "DEBUG");
        assert_eq!(Level::Warn.label(), "WARN");
        assert_eq!(Level::Error.label(), "ERROR");
    }
}
