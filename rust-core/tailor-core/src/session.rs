//! # Sessions
//!
//! Per-client string maps that survive between requests.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: `Session` only holds data, `SessionStore` only persists it
//! - **D**: The server depends on the `SessionStore` trait, not a backend
//!
//! Stored sessions expire a fixed lifetime after the client's last request
//! and only load for the client address that saved them.
//!
//! Session ids and CSRF tokens come from [`random_token`], 32 bytes from the
//! OS random source rendered as 64 hex characters.

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// String key/value data for one client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    data: HashMap<String, String>,
}

impl Session {
    /// An empty session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under a key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Store a value, replacing any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.data.remove(key)
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Drop every key
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Iterate over key/value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Session {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            data: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// 64 hex characters from the OS random source
///
/// # Errors
///
/// Returns `Error::Random` when the OS cannot supply randomness.
pub fn random_token() -> Result<String> {
    let mut bytes = [0_u8; 32];
    getrandom::getrandom(&mut bytes).map_err(|e| Error::Random {
        message: e.to_string(),
    })?;

    let mut token = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(token, "{byte:02x}");
    }
    Ok(token)
}

/// Persistence for sessions, keyed by session id
///
/// A session is bound to the client address it was saved for. Loading it
/// from another address, or after it expired, finds nothing.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The live session saved under `id` for `client_address`
    async fn load(&self, id: &str, client_address: Option<&str>) -> Option<Session>;

    /// Save a session under `id`, restarting its lifetime
    async fn save(&self, id: &str, session: Session, client_address: Option<&str>);

    /// Forget the session under `id`
    async fn remove(&self, id: &str);
}

#[derive(Debug)]
struct StoredSession {
    session: Session,
    client_address: Option<String>,
    expires_at: Instant,
}

impl StoredSession {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Sessions kept in process memory
///
/// Expired sessions are evicted whenever another session is saved.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
    lifetime: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_lifetime(SessionConfig::default().lifetime())
    }
}

impl MemorySessionStore {
    /// An empty store with the default one hour lifetime
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store whose sessions live for `lifetime` after each save
    #[must_use]
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            lifetime,
        }
    }

    /// Session lifetime
    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Number of stored sessions, expired ones included until evicted
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are stored
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop every expired session, returning how many went
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, stored| stored.is_live(now));
        before - sessions.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str, client_address: Option<&str>) -> Option<Session> {
        let sessions = self.sessions.read().await;
        let stored = sessions.get(id)?;
        if !stored.is_live(Instant::now()) {
            debug!("Session expired");
            return None;
        }
        if stored.client_address.as_deref() != client_address {
            debug!("Session used from another client address");
            return None;
        }
        Some(stored.session.clone())
    }

    async fn save(&self, id: &str, session: Session, client_address: Option<&str>) {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, stored| stored.is_live(now));
        sessions.insert(
            id.to_string(),
            StoredSession {
                session,
                client_address: client_address.map(str::to_owned),
                expires_at: now + self.lifetime,
            },
        );
    }

    async fn remove(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_map() {
        let mut session = Session::new();
        assert!(session.is_empty());

        session.set("userId", "3");
        assert_eq!(session.get("userId"), Some("3"));
        assert_eq!(session.len(), 1);

        assert_eq!(session.remove("userId"), Some("3".to_string()));
        assert_eq!(session.get("userId"), None);
    }

    #[test]
    fn test_session_from_pairs() {
        let session: Session = [("csrfKey", "abcd")].into_iter().collect();
        assert_eq!(session.get("csrfKey"), Some("abcd"));
    }

    #[test]
    fn test_random_token_shape() {
        let token = random_token().unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, random_token().unwrap());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemorySessionStore::new();
        assert!(store.load("abc", Some("10.0.0.1")).await.is_none());

        let mut session = Session::new();
        session.set("userId", "1");
        store.save("abc", session.clone(), Some("10.0.0.1")).await;
        assert_eq!(store.load("abc", Some("10.0.0.1")).await, Some(session));
        assert_eq!(store.len().await, 1);

        store.remove("abc").await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_session_is_bound_to_client_address() {
        let store = MemorySessionStore::new();
        store
            .save("abc", [("csrfKey", "abcd")].into_iter().collect(), Some("10.0.0.1"))
            .await;

        assert!(store.load("abc", Some("10.0.0.2")).await.is_none());
        assert!(store.load("abc", None).await.is_none());
        assert!(store.load("abc", Some("10.0.0.1")).await.is_some());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_missing_and_evicted() {
        let store = MemorySessionStore::with_lifetime(Duration::from_millis(100));
        store.save("old", Session::new(), None).await;
        store.save("older", Session::new(), None).await;
        assert!(store.load("old", None).await.is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.load("old", None).await.is_none());
        assert_eq!(store.len().await, 2);

        store.save("new", Session::new(), None).await;
        assert_eq!(store.len().await, 1);
        assert!(store.load("new", None).await.is_some());
    }

    #[tokio::test]
    async fn test_save_restarts_lifetime() {
        let store = MemorySessionStore::with_lifetime(Duration::from_millis(200));
        store.save("abc", Session::new(), None).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        store.save("abc", Session::new(), None).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(store.load("abc", None).await.is_some());
    }

    #[tokio::test]
    async fn test_evict_expired() {
        let store = MemorySessionStore::with_lifetime(Duration::ZERO);
        store.save("abc", Session::new(), None).await;
        assert_eq!(store.evict_expired().await, 1);
        assert!(store.is_empty().await);
    }
}
