//! Terminal emulator façade
//!
//! Binds the tokenizer and the screen buffer into a single `feed(bytes)`
//! operation. Bytes that end mid-sequence (PTYs deliver partial writes)
//! are carried over to the next feed.

use super::parser::{next_token, Scan};
use super::state::{Response, Row, ScreenBuffer};

pub struct TerminalEmulator {
    screen: ScreenBuffer,
    /// Unconsumed tail of the last feed: a truncated escape sequence or
    /// UTF-8 character waiting for its remaining bytes.
    pending: Vec<u8>,
}

impl TerminalEmulator {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            screen: ScreenBuffer::new(rows, cols),
            pending: Vec::new(),
        }
    }

    /// Feed raw PTY output. Returns any answerbacks (device status and
    /// attribute queries) the caller should write back to the PTY.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Response> {
        self.pending.extend_from_slice(bytes);

        let mut responses = Vec::new();
        let mut pos = 0;
        loop {
            match next_token(&self.pending, pos) {
                Scan::Token(token, next) => {
                    if let Some(response) = self.screen.apply(&token) {
                        responses.push(response);
                    }
                    pos = next;
                }
                Scan::Done => {
                    pos = self.pending.len();
                    break;
                }
                Scan::Incomplete => break,
            }
        }
        self.pending.drain(..pos);
        responses
    }

    pub fn screen(&self) -> &ScreenBuffer {
        &self.screen
    }

    /// Current grid, trailing blank rows trimmed.
    pub fn snapshot(&self) -> Vec<Row> {
        self.screen.snapshot()
    }

    /// The screen as plain text: one line per row, right-trimmed, trailing
    /// blank lines dropped.
    pub fn contents(&self) -> String {
        let lines: Vec<String> = self.screen.snapshot().iter().map(Row::text).collect();
        lines.join("\n")
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.screen.resize(rows, cols);
    }

    pub fn title(&self) -> &str {
        self.screen.title()
    }

    pub fn in_alt_screen(&self) -> bool {
        self.screen.in_alt_screen()
    }
}
