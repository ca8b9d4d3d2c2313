//! Session handle and persistence backend.
//!
//! A [`Session`] is created per request by the session middleware with
//! the inbound identifier (if any) adopted but nothing loaded. The first
//! access to any named section starts the session, loading data from the
//! backend or allocating a fresh identifier when the adopted one is
//! unknown or expired.

use crate::error::{Result, WeftError};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Key/value data of one named section.
pub type SectionData = HashMap<String, serde_json::Value>;

/// All sections of one session.
pub type SessionSections = HashMap<String, SectionData>;

/// Lifecycle of a session within one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Started,
    Destroyed,
}

/// Persistence collaborator for session data.
///
/// Treated as a synchronous external dependency; implementations decide
/// validity (an expired or unknown id loads as `None`).
pub trait SessionBackend: Send + Sync + 'static {
    fn load(&self, id: &str) -> Option<SessionSections>;
    fn save(&self, id: &str, data: &SessionSections);
    fn destroy(&self, id: &str);
    /// A new unique opaque identifier.
    fn generate_id(&self) -> String;
}

struct StoredSession {
    data: SessionSections,
    expires_at: SystemTime,
}

/// In-memory [`SessionBackend`] with per-entry expiry.
///
/// Expired entries are filtered on load and evicted lazily: whenever a
/// save pushes the map past the cleanup threshold, everything already
/// expired is dropped, keeping memory bounded without a sweeper task.
pub struct MemorySessionBackend {
    sessions: RwLock<HashMap<String, StoredSession>>,
    ttl: Duration,
    cleanup_threshold: usize,
}

impl MemorySessionBackend {
    const DEFAULT_CLEANUP_THRESHOLD: usize = 10_000;

    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            cleanup_threshold: Self::DEFAULT_CLEANUP_THRESHOLD,
        }
    }

    /// Override the entry count past which a save evicts expired
    /// entries.
    pub fn with_cleanup_threshold(mut self, threshold: usize) -> Self {
        self.cleanup_threshold = threshold;
        self
    }

    pub fn len(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySessionBackend {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl SessionBackend for MemorySessionBackend {
    fn load(&self, id: &str) -> Option<SessionSections> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(id)
            .filter(|s| SystemTime::now() < s.expires_at)
            .map(|s| s.data.clone())
    }

    fn save(&self, id: &str, data: &SessionSections) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(
            id.to_string(),
            StoredSession {
                data: data.clone(),
                expires_at: SystemTime::now() + self.ttl,
            },
        );

        if sessions.len() > self.cleanup_threshold {
            let now = SystemTime::now();
            sessions.retain(|_, s| now < s.expires_at);
        }
    }

    fn destroy(&self, id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(id);
    }

    fn generate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

struct SessionInner {
    inbound_id: Option<String>,
    id: Option<String>,
    sections: SessionSections,
    state: SessionState,
}

/// The per-request session handle.
///
/// Shared as `Arc<Session>`; interior state is lock-protected so the
/// handler, nested resolutions and the middleware all observe the same
/// session.
pub struct Session {
    backend: Arc<dyn SessionBackend>,
    inner: RwLock<SessionInner>,
}

impl Session {
    /// Create a handle with the inbound identifier adopted but not yet
    /// loaded.
    pub fn new(backend: Arc<dyn SessionBackend>, inbound_id: Option<String>) -> Self {
        Self {
            backend,
            inner: RwLock::new(SessionInner {
                inbound_id,
                id: None,
                sections: SessionSections::new(),
                state: SessionState::NotStarted,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.state
    }

    /// The identifier adopted from the inbound request, if any.
    pub fn inbound_id(&self) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.inbound_id.clone()
    }

    /// The active identifier. `None` until the session starts.
    pub fn id(&self) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.id.clone()
    }

    /// Read a value from a named section. Starts the session on first
    /// access. A destroyed session reads as empty.
    pub fn get<T: DeserializeOwned>(&self, section: &str, key: &str) -> Option<T> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.state == SessionState::Destroyed {
            return None;
        }
        self.start(&mut inner);
        inner
            .sections
            .get(section)
            .and_then(|s| s.get(key))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Write a value into a named section. Starts the session on first
    /// access.
    pub fn set<T: Serialize>(&self, section: &str, key: impl Into<String>, value: T) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.state == SessionState::Destroyed {
            return Err(WeftError::Session(
                "cannot write to a destroyed session".to_string(),
            ));
        }
        self.start(&mut inner);

        let value =
            serde_json::to_value(value).map_err(|e| WeftError::Session(e.to_string()))?;
        inner
            .sections
            .entry(section.to_string())
            .or_default()
            .insert(key.into(), value);
        Ok(())
    }

    /// Remove a value from a named section.
    pub fn remove(&self, section: &str, key: &str) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.state == SessionState::Destroyed {
            return;
        }
        self.start(&mut inner);
        if let Some(data) = inner.sections.get_mut(section) {
            data.remove(key);
        }
    }

    /// Destroy the session: drop server-side data and mark the handle so
    /// the middleware clears the client-side identifier.
    pub fn destroy(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = inner.id.as_deref().or(inner.inbound_id.as_deref()) {
            self.backend.destroy(id);
        }
        inner.sections.clear();
        inner.id = None;
        inner.state = SessionState::Destroyed;
    }

    /// Persist the session if it was started. Called by the middleware
    /// at end of request.
    pub fn commit(&self) {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if inner.state == SessionState::Started
            && let Some(id) = inner.id.as_deref()
        {
            self.backend.save(id, &inner.sections);
        }
    }

    /// Promote `NotStarted` to `Started`, resolving the identifier: an
    /// adopted id whose backend record still exists resumes it; an
    /// unknown or expired id (or no id at all) starts fresh with a new
    /// identifier.
    fn start(&self, inner: &mut SessionInner) {
        if inner.state != SessionState::NotStarted {
            return;
        }
        match inner.inbound_id.as_deref() {
            Some(adopted) => match self.backend.load(adopted) {
                Some(data) => {
                    inner.sections = data;
                    inner.id = Some(adopted.to_string());
                }
                None => {
                    inner.id = Some(self.backend.generate_id());
                }
            },
            None => {
                inner.id = Some(self.backend.generate_id());
            }
        }
        inner.state = SessionState::Started;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> Arc<MemorySessionBackend> {
        Arc::new(MemorySessionBackend::new(Duration::from_secs(3600)))
    }

    #[test]
    fn session_stays_unstarted_until_first_access() {
        let session = Session::new(backend(), None);
        assert_eq!(session.state(), SessionState::NotStarted);
        assert!(session.id().is_none());
    }

    #[test]
    fn first_access_starts_and_allocates_id() {
        let session = Session::new(backend(), None);
        let missing: Option<i64> = session.get("cli", "counter");
        assert!(missing.is_none());
        assert_eq!(session.state(), SessionState::Started);
        assert!(session.id().is_some());
    }

    #[test]
    fn data_persists_across_handles_with_same_id() {
        let backend = backend();

        let first = Session::new(backend.clone(), None);
        first.set("cli", "counter", 1).unwrap();
        first.commit();
        let id = first.id().unwrap();

        let second = Session::new(backend.clone(), Some(id.clone()));
        let counter: i64 = second.get("cli", "counter").unwrap();
        assert_eq!(counter, 1);
        // Resumed, not rotated.
        assert_eq!(second.id().unwrap(), id);
    }

    #[test]
    fn unknown_inbound_id_starts_fresh() {
        let session = Session::new(backend(), Some("stale".to_string()));
        session.set("cli", "counter", 1).unwrap();

        assert_ne!(session.id().unwrap(), "stale");
    }

    #[test]
    fn expired_record_starts_fresh() {
        let backend = Arc::new(MemorySessionBackend::new(Duration::from_secs(0)));
        let first = Session::new(backend.clone(), None);
        first.set("cli", "counter", 1).unwrap();
        first.commit();
        let id = first.id().unwrap();

        let second = Session::new(backend, Some(id.clone()));
        let missing: Option<i64> = second.get("cli", "counter");
        assert!(missing.is_none());
        assert_ne!(second.id().unwrap(), id);
    }

    #[test]
    fn destroy_drops_backend_record_and_blocks_writes() {
        let backend = backend();
        let session = Session::new(backend.clone(), None);
        session.set("auth", "user", "alice").unwrap();
        session.commit();
        let id = session.id().unwrap();
        assert!(backend.load(&id).is_some());

        session.destroy();
        assert_eq!(session.state(), SessionState::Destroyed);
        assert!(backend.load(&id).is_none());
        assert!(session.set("auth", "user", "bob").is_err());
        let gone: Option<String> = session.get("auth", "user");
        assert!(gone.is_none());
    }

    #[test]
    fn sections_are_independent() {
        let session = Session::new(backend(), None);
        session.set("cli", "counter", 1).unwrap();
        session.set("web", "counter", 9).unwrap();

        let cli: i64 = session.get("cli", "counter").unwrap();
        let web: i64 = session.get("web", "counter").unwrap();
        assert_eq!((cli, web), (1, 9));

        session.remove("cli", "counter");
        let cli: Option<i64> = session.get("cli", "counter");
        assert!(cli.is_none());
    }

    #[test]
    fn save_evicts_expired_entries_past_threshold() {
        let backend = MemorySessionBackend::new(Duration::from_secs(0)).with_cleanup_threshold(8);

        for i in 0..100 {
            backend.save(&format!("session-{i}"), &SessionSections::new());
        }

        // Everything saved with ttl=0 is already expired; the lazy
        // eviction keeps the map from growing without bound.
        assert!(backend.len() <= 9);
        assert!(backend.load("session-0").is_none());
    }

    #[test]
    fn commit_without_start_saves_nothing() {
        let backend = backend();
        let session = Session::new(backend.clone(), None);
        session.commit();
        assert!(backend.is_empty());
    }
}
