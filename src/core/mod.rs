//! Core terminal-driving components.
//!
//! This module contains the session and emulation logic:
//!
//! - **pty**: pseudo-terminal wrapper for spawning and driving children
//! - **term**: VT100/xterm screen emulation (tokenizer + screen buffer)
//! - **session**: pty + emulator bound into a long-lived session
//! - **registry**: id-keyed session map owning lifecycle and shutdown
//!
//! # Architecture
//!
//! ```text
//! SessionRegistry
//! └── PtySession (per id)
//!     ├── PtyHandle (master-side I/O with the child process)
//!     ├── reader thread (raw history ring + emulator feed)
//!     └── TerminalEmulator
//!         ├── tokenizer (text / C0 / CSI / OSC / escapes)
//!         └── ScreenBuffer (cell grid, cursor, attributes, alt screen)
//! ```

pub mod pty;
pub mod registry;
pub mod session;
pub mod term;
