//! Incremental escape-sequence stripping
//!
//! Runs bytes through a VTE parser and keeps what a terminal would treat as
//! text: printable characters and plain control bytes (`\r`, `\n`, `\t`,
//! ...). CSI, OSC, DCS and other escape sequences are dropped. Bytes are fed
//! one at a time, so a caller can watch the text grow without re-parsing
//! what it has already seen.

use alacritty_terminal::vte::{Parser, Perform};

/// Collects the text side of the parsed stream
#[derive(Default)]
struct TextSink {
    text: String,
}

impl Perform for TextSink {
    fn print(&mut self, c: char) {
        self.text.push(c);
    }

    fn execute(&mut self, byte: u8) {
        self.text.push(char::from(byte));
    }
}

#[derive(Default)]
pub struct AnsiStripper {
    parser: Parser,
    sink: TextSink,
}

impl AnsiStripper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte, returning whether the text grew
    ///
    /// Incomplete UTF-8 sequences and escape sequences add nothing until
    /// they are complete (escape sequences never add anything).
    pub fn push(&mut self, byte: u8) -> bool {
        let before = self.sink.text.len();
        self.parser.advance(&mut self.sink, byte);
        self.sink.text.len() != before
    }

    pub fn text(&self) -> &str {
        &self.sink.text
    }
}

impl std::fmt::Debug for AnsiStripper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnsiStripper")
            .field("text", &self.sink.text)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(bytes: &[u8]) -> String {
        let mut stripper = AnsiStripper::new();
        for byte in bytes {
            stripper.push(*byte);
        }
        stripper.text().to_string()
    }

    #[test]
    fn plain_controls_are_kept() {
        assert_eq!(strip(b"line one\r\nline two\tend"), "line one\r\nline two\tend");
    }

    #[test]
    fn csi_sequences_are_dropped() {
        assert_eq!(strip(b"\x1b[38;5;140mfoo\x1b[0m bar"), "foo bar");
        assert_eq!(strip(b"\x1b[2J\x1b[1;1Hhome"), "home");
    }

    #[test]
    fn osc_sequences_are_dropped() {
        assert_eq!(strip(b"\x1b]0;window title\x07prompt"), "prompt");
    }

    #[test]
    fn push_reports_growth() {
        let mut stripper = AnsiStripper::new();
        assert!(!stripper.push(0x1b));
        assert!(!stripper.push(b'['));
        assert!(!stripper.push(b'm'));
        assert!(stripper.push(b'x'));
        assert!(stripper.push(b'\r'));
        assert_eq!(stripper.text(), "x\r");
    }

    #[test]
    fn multibyte_characters_arrive_whole() {
        let mut stripper = AnsiStripper::new();
        let bytes = "é".as_bytes();
        assert!(!stripper.push(bytes[0]));
        assert!(stripper.push(bytes[1]));
        assert_eq!(stripper.text(), "é");
    }
}
