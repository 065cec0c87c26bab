//! [`KeyProvider`]: lock-free handle to the active key and retired keys.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;
use tracing::info;

use super::material::{KeyError, KeyMaterial};

/// Key configuration as read from the environment.
///
/// - `envelope_key`: base64 (standard, padded) of the 32-byte active key.
/// - `envelope_key_id`: identifier written into sealed envelopes.
/// - `envelope_retired_keys`: optional `id:base64,id:base64` list of keys that
///   may still open envelopes but are never used to seal.
#[derive(Clone, Deserialize)]
pub struct KeySettings {
    #[serde(default)]
    pub envelope_key: String,
    #[serde(default = "default_key_id")]
    pub envelope_key_id: String,
    #[serde(default)]
    pub envelope_retired_keys: Option<String>,
}

pub(crate) fn default_key_id() -> String {
    "primary".into()
}

impl fmt::Debug for KeySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySettings")
            .field("envelope_key", &"[REDACTED]")
            .field("envelope_key_id", &self.envelope_key_id)
            .field(
                "envelope_retired_keys",
                &self.envelope_retired_keys.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// One active key plus the retired keys that still open old envelopes.
#[derive(Debug)]
struct KeyRing {
    active: Arc<KeyMaterial>,
    retired: Vec<Arc<KeyMaterial>>,
}

impl KeyRing {
    fn contains(&self, id: &str) -> bool {
        self.active.id() == id || self.retired.iter().any(|k| k.id() == id)
    }

    fn get(&self, id: &str) -> Option<Arc<KeyMaterial>> {
        if self.active.id() == id {
            return Some(Arc::clone(&self.active));
        }
        self.retired.iter().find(|k| k.id() == id).cloned()
    }

    fn rotated(&self, next: Arc<KeyMaterial>) -> Result<Self, KeyError> {
        if self.contains(next.id()) {
            return Err(KeyError::DuplicateKeyId(next.id().to_owned()));
        }
        let mut retired = Vec::with_capacity(self.retired.len() + 1);
        retired.push(Arc::clone(&self.active));
        retired.extend(self.retired.iter().cloned());
        Ok(Self {
            active: next,
            retired,
        })
    }
}

/// Process-wide key material provider.
///
/// Backed by [`ArcSwap`] so that concurrent seals and opens never block and a
/// rotation is a single atomic swap. Cloning the provider clones the handle,
/// not the keys.
#[derive(Clone)]
pub struct KeyProvider {
    inner: Arc<ArcSwap<KeyRing>>,
}

impl KeyProvider {
    /// Create a provider with a single active key.
    pub fn new(active: KeyMaterial) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(KeyRing {
                active: Arc::new(active),
                retired: Vec::new(),
            })),
        }
    }

    /// Create a provider with an active key and retired keys.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::DuplicateKeyId`] if two keys share an identifier.
    pub fn with_retired(active: KeyMaterial, retired: Vec<KeyMaterial>) -> Result<Self, KeyError> {
        let mut ring = KeyRing {
            active: Arc::new(active),
            retired: Vec::with_capacity(retired.len()),
        };
        for key in retired {
            if ring.contains(key.id()) {
                return Err(KeyError::DuplicateKeyId(key.id().to_owned()));
            }
            ring.retired.push(Arc::new(key));
        }
        Ok(Self {
            inner: Arc::new(ArcSwap::from_pointee(ring)),
        })
    }

    /// Load the key ring from configuration.
    ///
    /// This is a startup invariant: callers should treat any error as fatal.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Missing`] if no key is configured, or another
    /// [`KeyError`] if any configured key is malformed.
    pub fn from_settings(settings: &KeySettings) -> Result<Self, KeyError> {
        if settings.envelope_key.trim().is_empty() {
            return Err(KeyError::Missing);
        }
        let active = KeyMaterial::from_base64(&settings.envelope_key_id, &settings.envelope_key)?;
        let retired = parse_retired(settings.envelope_retired_keys.as_deref().unwrap_or(""))?;
        let provider = Self::with_retired(active, retired)?;
        info!(
            active_key = %settings.envelope_key_id,
            retired_keys = provider.inner.load().retired.len(),
            "envelope key ring loaded"
        );
        Ok(provider)
    }

    /// The key new envelopes are sealed with.
    pub fn current_key(&self) -> Arc<KeyMaterial> {
        Arc::clone(&self.inner.load().active)
    }

    /// Look up a key (active or retired) by identifier.
    pub fn key_for(&self, id: &str) -> Option<Arc<KeyMaterial>> {
        self.inner.load().get(id)
    }

    /// Identifiers of all known keys, active first.
    pub fn key_ids(&self) -> Vec<String> {
        let ring = self.inner.load();
        std::iter::once(&ring.active)
            .chain(ring.retired.iter())
            .map(|k| k.id().to_owned())
            .collect()
    }

    /// Atomically make `next` the active key and retire the current one.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::DuplicateKeyId`] if `next` reuses a known id; the
    /// ring is left unchanged.
    pub fn rotate(&self, next: KeyMaterial) -> Result<(), KeyError> {
        let next = Arc::new(next);
        let mut outcome = Ok(());
        self.inner.rcu(|ring| match ring.rotated(Arc::clone(&next)) {
            Ok(rotated) => {
                outcome = Ok(());
                Arc::new(rotated)
            }
            Err(e) => {
                outcome = Err(e);
                Arc::clone(ring)
            }
        });
        if outcome.is_ok() {
            info!(active_key = %next.id(), "envelope key rotated");
        }
        outcome
    }
}

impl fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyProvider")
            .field("key_ids", &self.key_ids())
            .finish()
    }
}

/// Parse `id:base64,id:base64` into key material.
fn parse_retired(list: &str) -> Result<Vec<KeyMaterial>, KeyError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, encoded) = entry
                .split_once(':')
                .ok_or(KeyError::MalformedRetiredEntry)?;
            KeyMaterial::from_base64(id.trim(), encoded)
        })
        .collect()
}
