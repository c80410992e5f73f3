//! Error taxonomy for session operations.
//!
//! Malformed escape sequences are deliberately absent: the parser skips
//! them and keeps going, because programs routinely emit sequences a
//! partial emulator does not know and the display must still make
//! progress.

use thiserror::Error;

use crate::core::pty::PtyError;
use crate::core::session::SessionId;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The pty or the child process could not be created. The session was
    /// never registered.
    #[error("failed to spawn session: {0}")]
    Spawn(#[source] PtyError),

    /// Write or resize on a session whose child has already exited. The
    /// caller should terminate and discard the session.
    #[error("session is not running")]
    NotRunning,

    /// Unknown session id.
    #[error("no such session: {0}")]
    NotFound(SessionId),

    /// A pty operation on a live session failed.
    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error("pty i/o error: {0}")]
    Io(#[from] std::io::Error),
}
