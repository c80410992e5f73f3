//! Pseudo-terminal wrapper
//!
//! A safe wrapper around the OS pseudo-terminal facility (via
//! `portable-pty`) for spawning a child process wired to a terminal
//! device, writing keystrokes to it and resizing its window.

use std::io::{self, Read, Write};
use std::sync::Mutex;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("failed to open pseudo-terminal: {0}")]
    Open(anyhow::Error),

    #[error("failed to spawn child process: {0}")]
    Spawn(anyhow::Error),

    #[error("failed to resize pseudo-terminal: {0}")]
    Resize(anyhow::Error),

    #[error("pty i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// Everything a freshly spawned pty session needs: the handle the caller
/// keeps, plus the reader and child ends that move into the reader thread.
pub struct SpawnedPty {
    pub handle: PtyHandle,
    pub reader: Box<dyn Read + Send>,
    pub child: Box<dyn Child + Send + Sync>,
}

/// Master-side handle to a pseudo-terminal with a child attached.
pub struct PtyHandle {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    pid: Option<u32>,
}

impl PtyHandle {
    /// Allocate a pseudo-terminal at the given size and spawn `command`
    /// under the configured shell with its stdio wired to the slave side.
    pub fn spawn(command: &str, rows: u16, cols: u16, config: &Config) -> Result<SpawnedPty> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(PtyError::Open)?;

        let cmd = build_command(command, config);
        let child = pair.slave.spawn_command(cmd).map_err(PtyError::Spawn)?;
        // The slave end belongs to the child now.
        drop(pair.slave);

        let writer = pair.master.take_writer().map_err(PtyError::Open)?;
        let reader = pair.master.try_clone_reader().map_err(PtyError::Open)?;
        let killer = child.clone_killer();
        let pid = child.process_id();
        debug!(command, rows, cols, pid, "spawned pty child");

        Ok(SpawnedPty {
            handle: PtyHandle {
                master: Mutex::new(pair.master),
                writer: Mutex::new(writer),
                killer: Mutex::new(killer),
                pid,
            },
            reader,
            child,
        })
    }

    /// Write bytes to the master side (input to the child). No implicit
    /// newline is added.
    pub fn write(&self, data: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(data)?;
        writer.flush()
    }

    /// Update the OS-level window size.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.master
            .lock()
            .unwrap()
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(PtyError::Resize)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the child to terminate gracefully. Falls back to a no-op where
    /// the platform has no polite signal; the caller escalates to `kill`.
    pub fn signal_terminate(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }

    /// Force-kill the child. Errors are swallowed: a child that is already
    /// gone is the desired outcome.
    pub fn kill(&self) {
        if let Err(err) = self.killer.lock().unwrap().kill() {
            debug!(?err, "kill after exit");
        }
    }
}

/// Wrap `command` in the configured shell so pipelines and quoting work
/// the way they would at an interactive prompt.
fn build_command(command: &str, config: &Config) -> CommandBuilder {
    #[cfg(unix)]
    let mut cmd = {
        let shell = config
            .shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .unwrap_or_else(|| "/bin/sh".to_string());
        let mut c = CommandBuilder::new(shell);
        c.args(["-c", command]);
        c
    };

    #[cfg(windows)]
    let mut cmd = {
        let shell = config
            .shell
            .clone()
            .unwrap_or_else(|| "cmd.exe".to_string());
        let mut c = CommandBuilder::new(shell);
        c.args(["/C", command]);
        c
    };

    // CommandBuilder starts with an empty environment; copy the parent's
    // so the child sees PATH, HOME and friends.
    for (key, value) in std::env::vars() {
        cmd.env(key, value);
    }
    cmd.env("TERM", &config.term);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_spawn_and_reap() {
        let config = Config::default();
        let spawned = PtyHandle::spawn("exit 7", 24, 80, &config);
        assert!(spawned.is_ok());
        let mut spawned = spawned.unwrap();
        let status = spawned.child.wait().unwrap();
        assert_eq!(status.exit_code(), 7);
    }

    #[test]
    #[cfg(unix)]
    fn test_write_reaches_child() {
        let config = Config::default();
        let mut spawned = PtyHandle::spawn("cat", 24, 80, &config).unwrap();
        spawned.handle.write(b"ping\n").unwrap();

        let mut buf = [0u8; 256];
        let mut seen = Vec::new();
        while !String::from_utf8_lossy(&seen).contains("ping") {
            let n = spawned.reader.read(&mut buf).unwrap();
            assert!(n > 0, "pty closed before echo arrived");
            seen.extend_from_slice(&buf[..n]);
        }

        spawned.handle.kill();
        let _ = spawned.child.wait();
    }
}
