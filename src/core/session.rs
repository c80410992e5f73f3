//! Session management
//!
//! A pty-backed child process as a long-lived, interactively writable
//! session. A background reader appends everything the child prints to a
//! bounded raw-history ring and to the terminal emulator; callers write
//! keystrokes and read screen snapshots at any time.

use std::collections::VecDeque;
use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use portable_pty::Child;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::core::pty::{PtyHandle, SpawnedPty};
use crate::core::term::TerminalEmulator;
use crate::error::SessionError;

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub content: String,
    pub exit_code: Option<i32>,
    pub running: bool,
}

/// Bounded raw-output ring. When full, the oldest bytes are dropped,
/// never the newest. `total` is the absolute offset of everything ever
/// pushed, so callers can ask for "everything since".
struct RawHistory {
    buf: VecDeque<u8>,
    cap: usize,
    total: usize,
}

impl RawHistory {
    fn new(cap: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(cap.min(16 * 1024)),
            cap: cap.max(1),
            total: 0,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.total += bytes.len();
        self.buf.extend(bytes.iter().copied());
        let excess = self.buf.len().saturating_sub(self.cap);
        if excess > 0 {
            self.buf.drain(..excess);
        }
    }

    fn bytes_since(&self, since: Option<usize>) -> Vec<u8> {
        let start = self.total - self.buf.len();
        let skip = since
            .unwrap_or(0)
            .saturating_sub(start)
            .min(self.buf.len());
        self.buf.iter().skip(skip).copied().collect()
    }

    fn total(&self) -> usize {
        self.total
    }
}

/// An interactive terminal session.
pub struct PtySession {
    id: SessionId,
    pty: Arc<PtyHandle>,
    term: Arc<Mutex<TerminalEmulator>>,
    raw: Arc<Mutex<RawHistory>>,
    dims: Mutex<(u16, u16)>,
    running: Arc<AtomicBool>,
    exit_code: Arc<Mutex<Option<i32>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    start_time: Instant,
}

impl PtySession {
    /// Spawn `command` on a fresh pseudo-terminal and start the reader.
    pub fn spawn(
        id: SessionId,
        command: &str,
        rows: u16,
        cols: u16,
        config: &Config,
    ) -> Result<Self, SessionError> {
        let SpawnedPty {
            handle,
            reader,
            child,
        } = PtyHandle::spawn(command, rows, cols, config).map_err(SessionError::Spawn)?;

        let pty = Arc::new(handle);
        let term = Arc::new(Mutex::new(TerminalEmulator::new(rows, cols)));
        let raw = Arc::new(Mutex::new(RawHistory::new(config.raw_history_limit)));
        let running = Arc::new(AtomicBool::new(true));
        let exit_code = Arc::new(Mutex::new(None));

        let reader_handle = {
            let id = id.clone();
            let pty = Arc::clone(&pty);
            let term = Arc::clone(&term);
            let raw = Arc::clone(&raw);
            let running = Arc::clone(&running);
            let exit_code = Arc::clone(&exit_code);
            thread::Builder::new()
                .name(format!("pty-reader-{}", id))
                .spawn(move || {
                    reader_loop(id, reader, child, pty, term, raw, running, exit_code)
                })?
        };

        info!(%id, command, rows, cols, "session started");
        Ok(Self {
            id,
            pty,
            term,
            raw,
            dims: Mutex::new((rows, cols)),
            running,
            exit_code,
            reader: Mutex::new(Some(reader_handle)),
            start_time: Instant::now(),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn dimensions(&self) -> (u16, u16) {
        *self.dims.lock().unwrap()
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// True iff the child process has not exited.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock().unwrap()
    }

    /// Send keystrokes to the child. No implicit newline is added.
    pub fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }
        self.pty.write(data)?;
        Ok(())
    }

    /// Resize the OS window and the emulator grid. Existing lines are
    /// truncated or padded, never re-wrapped.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }
        self.pty.resize(rows, cols)?;
        self.term.lock().unwrap().resize(rows, cols);
        *self.dims.lock().unwrap() = (rows, cols);
        Ok(())
    }

    /// Current state: the rendered screen, or the raw byte history when
    /// `raw` is set.
    pub fn snapshot(&self, raw: bool) -> Snapshot {
        let content = if raw {
            String::from_utf8_lossy(&self.raw_history(None)).into_owned()
        } else {
            self.term.lock().unwrap().contents()
        };
        Snapshot {
            content,
            exit_code: self.exit_code(),
            running: self.is_running(),
        }
    }

    /// Raw output, optionally from an absolute offset previously obtained
    /// via [`PtySession::raw_offset`].
    pub fn raw_history(&self, since: Option<usize>) -> Vec<u8> {
        self.raw.lock().unwrap().bytes_since(since)
    }

    /// Total bytes the child has ever emitted; pass back as `since` for
    /// "everything printed since last check".
    pub fn raw_offset(&self) -> usize {
        self.raw.lock().unwrap().total()
    }

    /// Window title set by the child via OSC, if any.
    pub fn title(&self) -> String {
        self.term.lock().unwrap().title().to_string()
    }

    /// Whether the child has switched to the alternate screen buffer.
    pub fn in_alt_screen(&self) -> bool {
        self.term.lock().unwrap().in_alt_screen()
    }

    /// Terminate the child: polite signal, short grace period, then a
    /// forced kill, and join the reader. Idempotent; never fails.
    pub fn terminate(&self) {
        if self.is_running() {
            debug!(id = %self.id, "terminating session");
            self.pty.signal_terminate();
            let deadline = Instant::now() + Duration::from_millis(500);
            while self.is_running() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if self.is_running() {
                self.pty.kill();
            }
        }
        if let Some(handle) = self.reader.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Sole writer of the raw history, the emulator and the liveness fields.
/// Runs until the pty reaches EOF or errors, then reaps the child.
#[allow(clippy::too_many_arguments)]
fn reader_loop(
    id: SessionId,
    mut reader: Box<dyn Read + Send>,
    mut child: Box<dyn Child + Send + Sync>,
    pty: Arc<PtyHandle>,
    term: Arc<Mutex<TerminalEmulator>>,
    raw: Arc<Mutex<RawHistory>>,
    running: Arc<AtomicBool>,
    exit_code: Arc<Mutex<Option<i32>>>,
) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                raw.lock().unwrap().push(&buf[..n]);
                let responses = term.lock().unwrap().feed(&buf[..n]);
                for response in responses {
                    // Device queries answered on the child's behalf.
                    if let Err(err) = pty.write(&response.to_bytes()) {
                        debug!(%id, %err, "answerback write failed");
                    }
                }
            }
            Err(err) => {
                // EIO when the slave side closes is expected termination,
                // not a fault.
                #[cfg(unix)]
                let benign = err.raw_os_error() == Some(libc::EIO);
                #[cfg(not(unix))]
                let benign = false;
                if benign {
                    debug!(%id, "pty closed");
                } else {
                    warn!(%id, %err, "pty read failed, stopping reader");
                }
                break;
            }
        }
    }

    let code = match child.wait() {
        Ok(status) => Some(status.exit_code() as i32),
        Err(err) => {
            warn!(%id, %err, "failed to reap child");
            None
        }
    };
    *exit_code.lock().unwrap() = code;
    running.store(false, Ordering::SeqCst);
    info!(%id, ?code, "session exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn wait_for<F: Fn() -> bool>(what: &str, predicate: F) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !predicate() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_raw_history_drops_oldest() {
        let mut history = RawHistory::new(8);
        history.push(b"0123456789abcdef");
        assert_eq!(history.bytes_since(None), b"89abcdef".to_vec());
        assert_eq!(history.total(), 16);
        history.push(b"XY");
        // Exactly the cap's worth of the most recent bytes.
        assert_eq!(history.bytes_since(None), b"abcdefXY".to_vec());
        assert_eq!(history.bytes_since(None).len(), 8);
    }

    #[test]
    fn test_raw_history_since_offset() {
        let mut history = RawHistory::new(1024);
        history.push(b"first");
        let offset = history.total();
        history.push(b"second");
        assert_eq!(history.bytes_since(Some(offset)), b"second".to_vec());
        // An offset older than the retained window returns the whole ring.
        assert_eq!(history.bytes_since(Some(0)), b"firstsecond".to_vec());
        // An offset at the end returns nothing.
        assert_eq!(history.bytes_since(Some(history.total())), Vec::<u8>::new());
    }

    #[test]
    #[cfg(unix)]
    fn test_exit_code_recorded() {
        let config = Config::default();
        let session =
            PtySession::spawn(SessionId::generate(), "exit 3", 24, 80, &config).unwrap();
        wait_for("exit", || !session.is_running());
        assert_eq!(session.exit_code(), Some(3));
        // Writes after exit are rejected.
        assert!(matches!(
            session.write(b"anything"),
            Err(SessionError::NotRunning)
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_snapshot_shows_echoed_command() {
        let config = Config {
            shell: Some("/bin/sh".to_string()),
            ..Config::default()
        };
        let session = PtySession::spawn(SessionId::generate(), "sh", 24, 80, &config).unwrap();
        session.write(b"echo hi\n").unwrap();
        // Effects are asynchronous: give the child time to echo.
        wait_for("echo output", || {
            let content = session.snapshot(false).content;
            content.contains("echo hi") && content.lines().any(|line| line.trim() == "hi")
        });
        session.terminate();
    }

    #[test]
    #[cfg(unix)]
    fn test_alt_screen_enter_and_exit() {
        let config = Config {
            shell: Some("/bin/sh".to_string()),
            ..Config::default()
        };
        let session = PtySession::spawn(SessionId::generate(), "cat", 24, 80, &config).unwrap();
        session.write(b"\x1b[?1049h\n").unwrap();
        wait_for("alt screen", || session.in_alt_screen());
        session.write(b"\x1b[?1049l\n").unwrap();
        wait_for("primary screen", || !session.in_alt_screen());
        session.terminate();
        assert!(!session.is_running());
    }

    #[test]
    #[cfg(unix)]
    fn test_raw_snapshot_and_incremental_read() {
        let config = Config::default();
        let session =
            PtySession::spawn(SessionId::generate(), "printf abcdef", 24, 80, &config).unwrap();
        wait_for("output", || {
            session.snapshot(true).content.contains("abcdef")
        });
        let offset = session.raw_offset();
        assert!(session.raw_history(Some(offset)).is_empty());
        wait_for("exit", || !session.is_running());
    }

    #[test]
    #[cfg(unix)]
    fn test_terminate_is_idempotent() {
        let config = Config::default();
        let session =
            PtySession::spawn(SessionId::generate(), "sleep 30", 24, 80, &config).unwrap();
        assert!(session.is_running());
        session.terminate();
        assert!(!session.is_running());
        session.terminate();
        assert!(!session.is_running());
    }

    #[test]
    #[cfg(unix)]
    fn test_resize_propagates_to_emulator() {
        let config = Config::default();
        let session =
            PtySession::spawn(SessionId::generate(), "sleep 30", 24, 80, &config).unwrap();
        session.resize(10, 40).unwrap();
        assert_eq!(session.dimensions(), (10, 40));
        session.terminate();
        assert!(matches!(
            session.resize(5, 5),
            Err(SessionError::NotRunning)
        ));
    }
}
