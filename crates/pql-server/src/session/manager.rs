//! Session table: creation, lookup with lazy eviction, and a periodic reaper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::types::{ServerError, ServerResult};

use super::state::{AccessMode, Session};

/// Owns every live session. Shared by all connections behind one lock.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    idle_timeout: Duration,
    max_age: Duration,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration, max_age: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
            max_age,
        }
    }

    /// Create a session and return a snapshot of it.
    pub async fn create(&self, mode: AccessMode) -> Session {
        let session = Session::new(mode);
        let snapshot = session.clone();
        self.sessions
            .lock()
            .await
            .insert(session.id.clone(), session);
        tracing::info!(session = %snapshot.id, mode = %mode, "session created");
        snapshot
    }

    /// Snapshot of a live session. Expired sessions are evicted on the spot.
    pub async fn get(&self, id: &str) -> ServerResult<Session> {
        self.update(id, |s| s.clone()).await
    }

    /// Mark a session active.
    pub async fn touch(&self, id: &str) -> ServerResult<()> {
        self.update(id, |s| s.touch()).await
    }

    /// Run `f` against a live session.
    pub async fn update<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> ServerResult<R> {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();

        let expired = match sessions.get(id) {
            None => return Err(ServerError::SessionExpired(id.to_string())),
            Some(s) => s.is_expired(now, self.idle_timeout, self.max_age),
        };
        if expired {
            sessions.remove(id);
            tracing::info!(session = id, "session evicted on lookup");
            return Err(ServerError::SessionExpired(id.to_string()));
        }

        match sessions.get_mut(id) {
            Some(session) => Ok(f(session)),
            None => Err(ServerError::SessionExpired(id.to_string())),
        }
    }

    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(id).is_some();
        if removed {
            tracing::info!(session = id, "session closed");
        }
        removed
    }

    /// Evict every expired session; returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now, self.idle_timeout, self.max_age));
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "reaper swept sessions");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Sweep on a fixed interval until the manager is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(manager) => {
                        manager.sweep().await;
                    }
                    None => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_get_remove() {
        let manager = SessionManager::new(Duration::from_secs(60), Duration::from_secs(600));
        let session = manager.create(AccessMode::ReadOnly).await;
        let fetched = manager.get(&session.id).await.unwrap();
        assert_eq!(fetched.mode, AccessMode::ReadOnly);
        assert!(manager.remove(&session.id).await);
        assert!(matches!(
            manager.get(&session.id).await,
            Err(ServerError::SessionExpired(_))
        ));
    }

    #[tokio::test]
    async fn test_lazy_eviction() {
        let manager = SessionManager::new(Duration::from_millis(20), Duration::from_secs(600));
        let session = manager.create(AccessMode::ReadWrite).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        let err = manager.touch(&session.id).await.unwrap_err();
        assert_eq!(err.code(), "session_expired");
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweep_catches_idle_sessions() {
        let manager = SessionManager::new(Duration::from_millis(20), Duration::from_secs(600));
        manager.create(AccessMode::ReadWrite).await;
        manager.create(AccessMode::ReadWrite).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        let fresh = manager.create(AccessMode::ReadWrite).await;
        assert_eq!(manager.sweep().await, 2);
        assert!(manager.get(&fresh.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_mutates_in_place() {
        let manager = SessionManager::new(Duration::from_secs(60), Duration::from_secs(600));
        let session = manager.create(AccessMode::ReadWrite).await;
        manager
            .update(&session.id, |s| s.record("count lease"))
            .await
            .unwrap();
        assert_eq!(manager.get(&session.id).await.unwrap().history_len(), 1);
    }
}
