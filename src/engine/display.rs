//! Terminal display state and the control sequences that depend on it.

/// Carriage return plus erase-to-end-of-line.
pub const ERASE_LINE: &[u8] = b"\r\x1b[K";

/// Newline emitted before output that follows a stripped log line.
pub const NEWLINE: &[u8] = b"\n";

const WARN_ON: &str = "\x1b[33m";
const WARN_OFF: &str = "\x1b[0m";

/// Where the cursor is relative to the prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayState {
    /// Prompt (and any typed input) is the last thing on screen.
    AtPrompt,
    /// A log line was printed with its trailing newline held back.
    AwaitingNewline,
    /// Output ended mid-line.
    NoNewline,
}

impl DisplayState {
    /// Bytes that must precede a log body in this state.
    pub fn alert_prefix(self) -> &'static [u8] {
        match self {
            Self::AtPrompt => ERASE_LINE,
            Self::AwaitingNewline => NEWLINE,
            Self::NoNewline => b"",
        }
    }
}

/// Split a log body into what to print and the state it leaves behind.
///
/// A trailing `\n` (optionally preceded by `\r`) is held back so the next
/// output decides how to finish the line.
pub fn strip_trailing_newline(body: &[u8]) -> (&[u8], DisplayState) {
    match body {
        [rest @ .., b'\r', b'\n'] | [rest @ .., b'\n'] => (rest, DisplayState::AwaitingNewline),
        _ => (body, DisplayState::NoNewline),
    }
}

/// Notice for log lines the queue refused.
pub fn lost_notice(count: u32) -> String {
    format!("{}[{} log messages lost]{}\n", WARN_ON, count, WARN_OFF)
}

/// Notice for deferred log lines evicted while a command held the input.
pub fn discarded_notice(count: u32) -> String {
    format!("{}[{} log messages discarded]{}\n", WARN_ON, count, WARN_OFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_lf() {
        assert_eq!(strip_trailing_newline(b"hello\n"), (&b"hello"[..], DisplayState::AwaitingNewline));
    }

    #[test]
    fn test_strip_crlf() {
        assert_eq!(strip_trailing_newline(b"hello\r\n"), (&b"hello"[..], DisplayState::AwaitingNewline));
    }

    #[test]
    fn test_no_newline() {
        assert_eq!(strip_trailing_newline(b"partial"), (&b"partial"[..], DisplayState::NoNewline));
        assert_eq!(strip_trailing_newline(b""), (&b""[..], DisplayState::NoNewline));
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(DisplayState::AtPrompt.alert_prefix(), b"\r\x1b[K");
        assert_eq!(DisplayState::AwaitingNewline.alert_prefix(), b"\n");
        assert!(DisplayState::NoNewline.alert_prefix().is_empty());
    }

    #[test]
    fn test_notice_text() {
        assert_eq!(discarded_notice(1), "\x1b[33m[1 log messages discarded]\x1b[0m\n");
        assert!(lost_notice(12).contains("12 log messages lost"));
    }
}
