//! In-memory session registry

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::domain::builder::{BuilderSession, SessionId, SessionState};

/// Most recently ended session ids remembered for state lookups
pub const MAX_TOMBSTONES: usize = 10_000;

/// Shared reference to one live session.
///
/// The mutex serializes mutating operations on a single session; distinct
/// sessions never contend. Expiry is fixed at creation, so it is copied out
/// and can be checked without taking the lock.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    expires_at: DateTime<Utc>,
    session: Arc<Mutex<BuilderSession>>,
}

impl SessionHandle {
    pub fn new(session: BuilderSession) -> Self {
        Self {
            id: session.id().clone(),
            expires_at: session.expires_at(),
            session: Arc::new(Mutex::new(session)),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Acquire exclusive access to the session
    pub async fn lock(&self) -> MutexGuard<'_, BuilderSession> {
        self.session.lock().await
    }
}

/// Terminal states of removed sessions, oldest evicted first
#[derive(Debug)]
struct Tombstones {
    states: HashMap<SessionId, SessionState>,
    order: VecDeque<SessionId>,
    capacity: usize,
}

impl Tombstones {
    fn new(capacity: usize) -> Self {
        Self {
            states: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn record(&mut self, id: SessionId, state: SessionState) {
        if self.states.insert(id.clone(), state).is_some() {
            return;
        }

        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.states.remove(&oldest);
            }
        }
    }
}

/// Process-wide registry of builder sessions, keyed by session id.
///
/// Owned and injected explicitly; `shutdown` is the teardown hook. Removed
/// and purged ids keep a tombstone so their terminal state can still be
/// reported; only the latest `MAX_TOMBSTONES` are kept.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    tombstones: RwLock<Tombstones>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_tombstone_capacity(MAX_TOMBSTONES)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tombstone_capacity(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            tombstones: RwLock::new(Tombstones::new(capacity)),
        }
    }

    pub async fn insert(&self, handle: SessionHandle) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(handle.id().clone(), handle);
    }

    pub async fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// Remove a session and remember that it was destroyed
    pub async fn remove(&self, id: &SessionId) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(id).is_some()
        };

        if removed {
            let mut tombstones = self.tombstones.write().await;
            tombstones.record(id.clone(), SessionState::Destroyed);
        }

        removed
    }

    /// Terminal state of a session that is no longer held
    pub async fn tombstone(&self, id: &SessionId) -> Option<SessionState> {
        let tombstones = self.tombstones.read().await;
        tombstones.states.get(id).copied()
    }

    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop sessions whose expiry has passed. Never called implicitly.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<SessionId> = {
            let mut sessions = self.sessions.write().await;
            let expired: Vec<SessionId> = sessions
                .values()
                .filter(|handle| handle.is_expired_at(now))
                .map(|handle| handle.id().clone())
                .collect();
            for id in &expired {
                sessions.remove(id);
            }
            expired
        };

        let mut tombstones = self.tombstones.write().await;
        for id in &expired {
            tombstones.record(id.clone(), SessionState::Expired);
        }

        expired.len()
    }

    /// Drop every session. Used on process shutdown.
    pub async fn shutdown(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::builder::SessionLimits;
    use chrono::Duration;

    fn handle(now: DateTime<Utc>) -> SessionHandle {
        SessionHandle::new(BuilderSession::new(
            SessionId::generate(),
            "wf-1",
            &SessionLimits::default(),
            now,
        ))
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = SessionRegistry::new();
        let handle = handle(Utc::now());
        let id = handle.id().clone();

        registry.insert(handle).await;
        assert!(registry.get(&id).await.is_some());
        assert_eq!(registry.len().await, 1);

        assert!(registry.remove(&id).await);
        assert!(registry.get(&id).await.is_none());
        assert_eq!(registry.tombstone(&id).await, Some(SessionState::Destroyed));
        assert!(!registry.remove(&id).await);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let registry = SessionRegistry::new();
        let past = Utc::now() - Duration::hours(2);
        registry.insert(handle(past)).await;
        registry.insert(handle(Utc::now())).await;

        let stale = handle(past);
        let stale_id = stale.id().clone();
        registry.insert(stale).await;

        assert_eq!(registry.purge_expired(Utc::now()).await, 2);
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.tombstone(&stale_id).await, Some(SessionState::Expired));
    }

    #[tokio::test]
    async fn test_tombstones_are_capped() {
        let registry = SessionRegistry::with_tombstone_capacity(2);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let handle = handle(Utc::now());
            ids.push(handle.id().clone());
            registry.insert(handle).await;
        }
        for id in &ids {
            assert!(registry.remove(id).await);
        }

        assert_eq!(registry.tombstone(&ids[0]).await, None);
        assert_eq!(registry.tombstone(&ids[1]).await, Some(SessionState::Destroyed));
        assert_eq!(registry.tombstone(&ids[2]).await, Some(SessionState::Destroyed));
    }

    #[tokio::test]
    async fn test_shutdown_clears_everything() {
        let registry = SessionRegistry::new();
        registry.insert(handle(Utc::now())).await;
        registry.insert(handle(Utc::now())).await;

        assert_eq!(registry.shutdown().await, 2);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_handles_share_session() {
        let registry = SessionRegistry::new();
        let handle = handle(Utc::now());
        let id = handle.id().clone();
        registry.insert(handle).await;

        let a = registry.get(&id).await.unwrap();
        let b = registry.get(&id).await.unwrap();

        a.lock().await.record_audit("touch", serde_json::json!({}));
        assert_eq!(b.lock().await.audit_log().len(), 1);
    }
}
