//! [`TokenStore`]: shared, atomically replaced session token cell.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// Opaque bearer token issued by the backend on login.
///
/// `Debug` output is redacted so the token never reaches logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, exactly as sent in the authorization header.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// Holds the current session token, if any.
///
/// Backed by [`ArcSwapOption`]: `set` and `clear` are single atomic swaps
/// (last writer wins) and readers never observe a torn value or block.
/// Clones share the same cell.
#[derive(Clone, Debug, Default)]
pub struct TokenStore {
    inner: Arc<ArcSwapOption<SessionToken>>,
}

impl TokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current token.
    pub fn set(&self, token: SessionToken) {
        self.inner.store(Some(Arc::new(token)));
    }

    /// The current token, or `None` before login and after logout.
    pub fn get(&self) -> Option<Arc<SessionToken>> {
        self.inner.load_full()
    }

    /// Drop the current token.
    pub fn clear(&self) {
        self.inner.store(None);
    }

    /// Drop the current token only if it is still `expected`.
    ///
    /// Used when the backend rejects the token a call was sent with: a newer
    /// token stored by a concurrent login is left in place. Returns `true` if
    /// the token was cleared.
    pub fn clear_if(&self, expected: &Arc<SessionToken>) -> bool {
        let current = Some(Arc::clone(expected));
        let previous = self
            .inner
            .compare_and_swap(&current, None::<Arc<SessionToken>>);
        matches!(&*previous, Some(p) if Arc::ptr_eq(p, expected))
    }

    /// Returns `true` if a token is stored.
    pub fn is_authenticated(&self) -> bool {
        self.inner.load().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_before_login() {
        let store = TokenStore::new();
        assert!(store.get().is_none());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn set_then_get() {
        let store = TokenStore::new();
        store.set(SessionToken::new("abc"));
        assert_eq!(store.get().unwrap().as_str(), "abc");
    }

    #[test]
    fn set_then_clear_returns_none() {
        let store = TokenStore::new();
        store.set(SessionToken::new("abc"));
        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn last_writer_wins() {
        let store = TokenStore::new();
        store.set(SessionToken::new("first"));
        store.set(SessionToken::new("second"));
        assert_eq!(store.get().unwrap().as_str(), "second");
    }

    #[test]
    fn clear_if_matches_current() {
        let store = TokenStore::new();
        store.set(SessionToken::new("abc"));
        let sent = store.get().unwrap();
        assert!(store.clear_if(&sent));
        assert!(store.get().is_none());
    }

    #[test]
    fn clear_if_keeps_newer_token() {
        let store = TokenStore::new();
        store.set(SessionToken::new("stale"));
        let sent = store.get().unwrap();
        store.set(SessionToken::new("fresh"));
        assert!(!store.clear_if(&sent));
        assert_eq!(store.get().unwrap().as_str(), "fresh");
    }

    #[test]
    fn clones_share_the_cell() {
        let store = TokenStore::new();
        let handle = store.clone();
        store.set(SessionToken::new("abc"));
        assert!(handle.is_authenticated());
        handle.clear();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn concurrent_writers_leave_a_whole_token() {
        let store = TokenStore::new();
        let writers: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..200 {
                        if j % 3 == 0 {
                            store.clear();
                        } else {
                            store.set(SessionToken::new(format!("token-{i}-{j}")));
                        }
                        if let Some(t) = store.get() {
                            assert!(t.as_str().starts_with("token-"));
                        }
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
    }

    #[test]
    fn debug_is_redacted() {
        let out = format!("{:?}", SessionToken::new("super-secret"));
        assert!(!out.contains("super-secret"));
    }
}
