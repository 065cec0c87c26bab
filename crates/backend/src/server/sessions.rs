//! [`SessionRegistry`]: in-memory session tokens with a fixed lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// What a session is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Trainer,
}

impl Role {
    /// Lowercase name, as reported to the client on login.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Trainer => "trainer",
        }
    }
}

/// A live session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Role granted at login.
    pub role: Role,
    /// Admin username, or the trainer's record id.
    pub subject: String,
    expires_at: Instant,
}

impl Session {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Issued sessions keyed by their opaque token.
///
/// Expired entries are dropped on lookup, on each new login, and on
/// [`SessionRegistry::len`].
#[derive(Clone, Debug)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionRegistry {
    /// Create an empty registry whose sessions live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Start a session and return its token.
    ///
    /// Sessions that have already expired are pruned first, so abandoned
    /// tokens do not accumulate.
    pub async fn issue(&self, role: Role, subject: impl Into<String>) -> String {
        let token = Uuid::new_v4().to_string();
        let now = Instant::now();
        let session = Session {
            role,
            subject: subject.into(),
            expires_at: now + self.ttl,
        };
        let mut guard = self.inner.write().await;
        guard.retain(|_, s| !s.is_expired(now));
        guard.insert(token.clone(), session);
        token
    }

    /// Look up a live session.
    pub async fn resolve(&self, token: &str) -> Option<Session> {
        let now = Instant::now();
        {
            let guard = self.inner.read().await;
            match guard.get(token) {
                Some(s) if !s.is_expired(now) => return Some(s.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.inner.write().await.remove(token);
        None
    }

    /// End one session. Returns `true` if it existed.
    pub async fn revoke(&self, token: &str) -> bool {
        self.inner.write().await.remove(token).is_some()
    }

    /// End every session belonging to `subject`. Returns how many were ended.
    pub async fn revoke_subject(&self, subject: &str) -> usize {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, s| s.subject != subject);
        before - guard.len()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.write().await;
        guard.retain(|_, s| !s.is_expired(now));
        guard.len()
    }
}
