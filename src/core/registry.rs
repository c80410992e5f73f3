//! Session registry
//!
//! Concurrency-safe map from session ids to live sessions. Owns session
//! lifecycle: create, list, terminate, and terminate-all on shutdown so
//! no child process or descriptor outlives the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::config::Config;
use crate::core::session::{PtySession, SessionId, Snapshot};
use crate::error::SessionError;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<PtySession>>>,
    config: Config,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl SessionRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Spawn `command` in a new session with a generated id.
    pub fn create(&self, command: &str, rows: u16, cols: u16) -> Result<SessionId, SessionError> {
        self.create_with_id(SessionId::generate(), command, rows, cols)
    }

    /// Spawn `command` under a caller-supplied id. An existing session
    /// with the same id is terminated and replaced.
    pub fn create_with_id(
        &self,
        id: SessionId,
        command: &str,
        rows: u16,
        cols: u16,
    ) -> Result<SessionId, SessionError> {
        let previous = self.sessions.lock().unwrap().remove(&id);
        if let Some(old) = previous {
            info!(%id, "replacing existing session");
            old.terminate();
        }

        let session = Arc::new(PtySession::spawn(
            id.clone(),
            command,
            rows,
            cols,
            &self.config,
        )?);
        self.sessions.lock().unwrap().insert(id.clone(), session);
        Ok(id)
    }

    fn get(&self, id: &SessionId) -> Result<Arc<PtySession>, SessionError> {
        self.sessions
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    /// Send keystrokes to a session.
    pub fn write(&self, id: &SessionId, data: &[u8]) -> Result<(), SessionError> {
        self.get(id)?.write(data)
    }

    /// Resize a session's window and screen.
    pub fn resize(&self, id: &SessionId, rows: u16, cols: u16) -> Result<(), SessionError> {
        self.get(id)?.resize(rows, cols)
    }

    /// Current state of a session: rendered screen, or raw history when
    /// `raw` is set.
    pub fn snapshot(&self, id: &SessionId, raw: bool) -> Result<Snapshot, SessionError> {
        Ok(self.get(id)?.snapshot(raw))
    }

    /// Raw output of a session, optionally from a previous offset.
    pub fn raw_history(
        &self,
        id: &SessionId,
        since: Option<usize>,
    ) -> Result<Vec<u8>, SessionError> {
        Ok(self.get(id)?.raw_history(since))
    }

    /// Direct access to a session for callers that poll repeatedly.
    pub fn session(&self, id: &SessionId) -> Result<Arc<PtySession>, SessionError> {
        self.get(id)
    }

    /// Terminate a session and drop it from the registry.
    pub fn terminate(&self, id: &SessionId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .lock()
            .unwrap()
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        session.terminate();
        Ok(())
    }

    pub fn list(&self) -> Vec<SessionId> {
        self.sessions.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().unwrap().is_empty()
    }

    /// Terminate every session and join their readers. Called on drop as
    /// well, so embedding processes cannot leak children.
    pub fn shutdown(&self) {
        let drained: Vec<(SessionId, Arc<PtySession>)> =
            self.sessions.lock().unwrap().drain().collect();
        for (id, session) in drained {
            info!(%id, "shutting down session");
            session.terminate();
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_id_is_not_found() {
        let registry = SessionRegistry::default();
        let id = SessionId::from("missing");
        assert!(matches!(
            registry.write(&id, b"x"),
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            registry.snapshot(&id, false),
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            registry.terminate(&id),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_create_list_terminate() {
        let registry = SessionRegistry::default();
        let id = registry.create("sleep 30", 24, 80).unwrap();
        assert_eq!(registry.list(), vec![id.clone()]);
        registry.terminate(&id).unwrap();
        assert!(registry.is_empty());
        // Terminating twice is a caller error: the id is gone.
        assert!(matches!(
            registry.terminate(&id),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_create_with_id_replaces() {
        let registry = SessionRegistry::default();
        let id = SessionId::from("slot-1");
        registry
            .create_with_id(id.clone(), "sleep 30", 24, 80)
            .unwrap();
        registry
            .create_with_id(id.clone(), "sleep 30", 10, 40)
            .unwrap();
        assert_eq!(registry.len(), 1);
        let session = registry.session(&id).unwrap();
        assert_eq!(session.dimensions(), (10, 40));
        registry.shutdown();
        assert!(registry.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_shutdown_terminates_all() {
        let registry = SessionRegistry::default();
        let a = registry.create("sleep 30", 24, 80).unwrap();
        let b = registry.create("sleep 30", 24, 80).unwrap();
        let session_a = registry.session(&a).unwrap();
        let session_b = registry.session(&b).unwrap();
        registry.shutdown();
        assert!(!session_a.is_running());
        assert!(!session_b.is_running());
        assert!(registry.is_empty());
    }
}
