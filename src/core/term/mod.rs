//! VT100/xterm terminal emulation.
//!
//! - **parser**: byte-stream tokenizer (text runs, C0 controls, CSI/OSC)
//! - **state**: the screen buffer consuming tokens
//! - **emulator**: façade binding the two into a single `feed()` operation

pub mod emulator;
pub mod parser;
pub mod state;

pub use emulator::TerminalEmulator;
pub use parser::{next_token, Scan, Token};
pub use state::{AttrFlags, Cell, CellAttrs, Color, CursorState, Response, Row, ScreenBuffer};
