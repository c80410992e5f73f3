//! termdrive - drive terminal programs as if a human were typing
//!
//! termdrive lets a calling program (an agent, a test harness, a server)
//! run arbitrary terminal programs - shells, editors, full-screen TUIs -
//! behind a pseudo-terminal, send them keystrokes, and read back exactly
//! what the screen looks like at any moment.
//!
//! # Features
//!
//! - **Sessions**: spawn a command on a pty, write input, resize, and
//!   terminate it cleanly; a registry tracks any number of sessions
//! - **Screen emulation**: a VT100/xterm subset interpreter maintains the
//!   2D cell grid - cursor, colors, attributes, scroll region, alternate
//!   screen - from the raw byte stream
//! - **Two read models**: `snapshot` for "the screen as displayed",
//!   `raw_history` for "every byte printed since last check"
//!
//! # Quick Start
//!
//! ```no_run
//! use termdrive::{Config, SessionRegistry};
//!
//! # fn main() -> Result<(), termdrive::SessionError> {
//! let registry = SessionRegistry::new(Config::load());
//! let id = registry.create("bash", 24, 80)?;
//! registry.write(&id, b"echo hi\n")?;
//! // The child answers asynchronously; poll until the screen settles.
//! let snapshot = registry.snapshot(&id, false)?;
//! println!("{}", snapshot.content);
//! registry.terminate(&id)?;
//! # Ok(())
//! # }
//! ```
//!
//! Network transports, HTML/plain-text exporters and viewers are
//! collaborators layered on top: they consume [`Snapshot`]s and cell
//! grids, and this crate stays agnostic to them.

pub mod config;
pub mod core;
pub mod error;

pub use config::Config;
pub use core::registry::SessionRegistry;
pub use core::session::{PtySession, SessionId, Snapshot};
pub use core::term::{
    AttrFlags, Cell, CellAttrs, Color, CursorState, Row, ScreenBuffer, TerminalEmulator,
};
pub use error::SessionError;
