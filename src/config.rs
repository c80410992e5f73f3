//! Configuration for termdrive sessions.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.termdrive/config.toml`
//! - Session defaults: shell, terminal type, dimensions, history cap
//!
//! # Configuration File
//!
//! The configuration file is located at `~/.termdrive/config.toml` (or the
//! path named by the `TERMDRIVE_CONFIG` environment variable):
//!
//! ```toml
//! # Shell used to run session commands (optional; $SHELL otherwise)
//! shell = "/bin/bash"
//!
//! # Terminal type advertised to children
//! term = "xterm-256color"
//!
//! # Default session dimensions
//! rows = 24
//! cols = 80
//!
//! # Raw output kept per session, in bytes
//! raw_history_limit = 49152
//! ```

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shell used to wrap session commands
    pub shell: Option<String>,
    /// Terminal type exported as `TERM`
    pub term: String,
    /// Default rows for new sessions
    pub rows: u16,
    /// Default columns for new sessions
    pub cols: u16,
    /// Cap on the per-session raw output ring, in bytes
    pub raw_history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            term: "xterm-256color".to_string(),
            rows: 24,
            cols: 80,
            raw_history_limit: 48 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults.
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                if let Ok(content) = fs::read_to_string(&path) {
                    match toml::from_str(&content) {
                        Ok(config) => return config,
                        Err(err) => {
                            tracing::warn!(?path, %err, "ignoring malformed config file");
                        }
                    }
                }
            }
        }
        Self::default()
    }

    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os("TERMDRIVE_CONFIG") {
            return Some(PathBuf::from(path));
        }
        home_dir().map(|home| home.join(".termdrive").join("config.toml"))
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
