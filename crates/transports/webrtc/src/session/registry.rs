//! Process-wide registry of live sessions
//!
//! The registry never holds session state. Each entry is a [`SessionHandle`]:
//! the id, the role, and a control sender into the task that owns the
//! session.

use super::state::Role;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

/// Unique session identifier (UUID v4)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands a session task accepts from outside
#[derive(Debug)]
pub enum SessionCommand {
    /// Close the session; `done` fires once cleanup has finished
    Close { done: oneshot::Sender<()> },
}

/// Cloneable reference to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    role: Role,
    control: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(id: SessionId, role: Role, control: mpsc::Sender<SessionCommand>) -> Self {
        Self { id, role, control }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the owning task is still accepting commands
    pub fn is_alive(&self) -> bool {
        !self.control.is_closed()
    }

    /// Ask the owning task to close the session and wait until it has.
    ///
    /// Resolves immediately if the task has already finished.
    pub async fn close(&self) {
        let (done, closed) = oneshot::channel();
        if self.control.send(SessionCommand::Close { done }).await.is_err() {
            debug!(session_id = %self.id, "Session task already gone");
            return;
        }
        let _ = closed.await;
    }
}

/// Collection of live sessions keyed by id
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and hand the handle back.
    ///
    /// Ids are unique for the life of the process, so a duplicate is a bug
    /// in the caller and is rejected.
    pub fn add(&self, handle: SessionHandle) -> Result<SessionHandle> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(handle.id()) {
            return Err(Error::SessionError(format!(
                "session {} is already registered",
                handle.id()
            )));
        }
        sessions.insert(handle.id().clone(), handle.clone());
        debug!(session_id = %handle.id(), active = sessions.len(), "Session registered");
        Ok(handle)
    }

    /// Remove a session. Removing an absent id is a no-op; returns whether
    /// anything was removed.
    pub fn remove(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.lock();
        let removed = sessions.remove(id).is_some();
        if removed {
            debug!(session_id = %id, active = sessions.len(), "Session deregistered");
        }
        removed
    }

    /// Call `f` for every registered session.
    ///
    /// Iterates over a snapshot taken under the lock, so `f` may call back
    /// into the registry.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&SessionHandle),
    {
        for handle in self.snapshot() {
            f(&handle);
        }
    }

    /// Handles of every registered session at this instant
    pub fn snapshot(&self) -> Vec<SessionHandle> {
        self.sessions.lock().values().cloned().collect()
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn clear(&self) {
        self.sessions.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn handle() -> (SessionHandle, mpsc::Receiver<SessionCommand>) {
        let (tx, rx) = mpsc::channel(1);
        (SessionHandle::new(SessionId::new(), Role::Answerer, tx), rx)
    }

    #[test]
    fn test_session_ids_are_unique() {
        let ids: HashSet<SessionId> = (0..1000).map(|_| SessionId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_add_and_remove() {
        let registry = SessionRegistry::new();
        let (h, _rx) = handle();
        let id = h.id().clone();

        registry.add(h).unwrap();
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let (h1, _rx1) = handle();
        let (h2, _rx2) = handle();
        let id = h1.id().clone();
        registry.add(h1).unwrap();
        registry.add(h2).unwrap();

        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = SessionRegistry::new();
        let (h, _rx) = handle();
        registry.add(h.clone()).unwrap();
        let err = registry.add(h).unwrap_err();
        assert!(matches!(err, Error::SessionError(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_for_each_may_reenter_registry() {
        let registry = SessionRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (h, rx) = handle();
            registry.add(h).unwrap();
            receivers.push(rx);
        }

        let mut visited = 0;
        registry.for_each(|h| {
            visited += 1;
            registry.remove(h.id());
        });
        assert_eq!(visited, 3);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_close_resolves_when_task_gone() {
        let (h, rx) = handle();
        drop(rx);
        assert!(!h.is_alive());
        h.close().await;
    }

    #[tokio::test]
    async fn test_close_waits_for_ack() {
        let (h, mut rx) = handle();
        let task = tokio::spawn(async move {
            match rx.recv().await {
                Some(SessionCommand::Close { done }) => {
                    let _ = done.send(());
                    true
                }
                None => false,
            }
        });
        h.close().await;
        assert!(task.await.unwrap());
    }
}
