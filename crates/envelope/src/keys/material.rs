//! [`KeyMaterial`]: a single identified 256-bit envelope key.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::KEY_LEN;

/// Longest accepted key identifier.
pub const MAX_KEY_ID_LEN: usize = 64;

/// Errors produced while loading or rotating key material.
///
/// Messages describe what is wrong with the material, never its contents.
#[derive(Debug, Error)]
pub enum KeyError {
    /// No key was configured.
    #[error("no envelope key configured")]
    Missing,

    /// The configured key is not valid base64.
    #[error("envelope key {0:?} is not valid base64")]
    InvalidEncoding(String),

    /// The decoded key has an unexpected length.
    #[error("envelope key {id:?} has invalid length: expected {KEY_LEN} bytes, got {len}")]
    InvalidLength {
        /// Identifier of the offending key.
        id: String,
        /// Decoded length.
        len: usize,
    },

    /// The key identifier is empty, too long, or contains characters other
    /// than ASCII letters, digits, `-` and `_`.
    #[error("invalid key id {0:?}")]
    InvalidKeyId(String),

    /// Two keys in the ring share an identifier.
    #[error("duplicate key id {0:?}")]
    DuplicateKeyId(String),

    /// A retired key entry is not of the form `id:base64`.
    #[error("malformed retired key entry (expected `id:base64`)")]
    MalformedRetiredEntry,
}

/// AEAD algorithm a key is used with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// AES-256-GCM-SIV (RFC 8452).
    Aes256GcmSiv,
}

/// Returns `true` if `id` can appear in an envelope header.
pub fn is_valid_key_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_KEY_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// A 256-bit envelope key with its identifier.
///
/// The key bytes are overwritten with zeroes on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    #[zeroize(skip)]
    id: String,
    #[zeroize(skip)]
    algorithm: Algorithm,
    bytes: [u8; KEY_LEN],
}

impl KeyMaterial {
    /// Build key material from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyId`] if `id` is not a valid key id.
    pub fn new(id: impl Into<String>, bytes: [u8; KEY_LEN]) -> Result<Self, KeyError> {
        let id = id.into();
        if !is_valid_key_id(&id) {
            return Err(KeyError::InvalidKeyId(id));
        }
        Ok(Self {
            id,
            algorithm: Algorithm::Aes256GcmSiv,
            bytes,
        })
    }

    /// Decode key material from standard (padded) base64.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidEncoding`] or [`KeyError::InvalidLength`] if
    /// `encoded` does not decode to exactly [`KEY_LEN`] bytes.
    pub fn from_base64(id: &str, encoded: &str) -> Result<Self, KeyError> {
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| KeyError::InvalidEncoding(id.to_owned()))?,
        );
        if decoded.len() != KEY_LEN {
            return Err(KeyError::InvalidLength {
                id: id.to_owned(),
                len: decoded.len(),
            });
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        let key = Self::new(id, bytes);
        bytes.zeroize();
        key
    }

    /// Identifier written into every envelope sealed with this key.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// AEAD algorithm this key is used with.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Raw key bytes for the cipher layer.
    pub(crate) fn expose(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key bytes, even in debug builds.
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .field("algorithm", &self.algorithm)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_id_rules() {
        assert!(is_valid_key_id("primary"));
        assert!(is_valid_key_id("k-2024_01"));
        assert!(!is_valid_key_id(""));
        assert!(!is_valid_key_id("has.dot"));
        assert!(!is_valid_key_id("has space"));
        assert!(!is_valid_key_id(&"x".repeat(MAX_KEY_ID_LEN + 1)));
    }

    #[test]
    fn from_base64_accepts_32_bytes() {
        let encoded = STANDARD.encode([0x42u8; KEY_LEN]);
        let key = KeyMaterial::from_base64("primary", &encoded).unwrap();
        assert_eq!(key.id(), "primary");
        assert_eq!(key.expose(), &[0x42u8; KEY_LEN]);
        assert_eq!(key.algorithm(), Algorithm::Aes256GcmSiv);
    }

    #[test]
    fn from_base64_rejects_wrong_length() {
        let encoded = STANDARD.encode([0u8; 16]);
        let err = KeyMaterial::from_base64("primary", &encoded).unwrap_err();
        assert!(matches!(err, KeyError::InvalidLength { len: 16, .. }));
    }

    #[test]
    fn from_base64_rejects_garbage() {
        let err = KeyMaterial::from_base64("primary", "not base64!").unwrap_err();
        assert!(matches!(err, KeyError::InvalidEncoding(_)));
    }

    #[test]
    fn new_rejects_bad_id() {
        assert!(matches!(
            KeyMaterial::new("a.b", [0u8; KEY_LEN]),
            Err(KeyError::InvalidKeyId(_))
        ));
    }

    #[test]
    fn zeroize_wipes_bytes_but_keeps_identity() {
        fn wiped_on_drop<T: ZeroizeOnDrop>() {}
        wiped_on_drop::<KeyMaterial>();

        let mut key = KeyMaterial::new("primary", [0x5Au8; KEY_LEN]).unwrap();
        key.zeroize();
        assert_eq!(key.expose(), &[0u8; KEY_LEN]);
        assert_eq!(key.id(), "primary");
        assert_eq!(key.algorithm(), Algorithm::Aes256GcmSiv);
    }

    #[test]
    fn debug_is_redacted() {
        let key = KeyMaterial::new("primary", [0xABu8; KEY_LEN]).unwrap();
        let out = format!("{key:?}");
        assert!(out.contains("REDACTED"));
        assert!(!out.contains("171"), "key byte leaked: {out}");
    }

    #[test]
    fn errors_do_not_echo_material() {
        let secret = "c2VjcmV0LWtleS1tYXRlcmlhbA==";
        let err = KeyMaterial::from_base64("primary", secret).unwrap_err();
        assert!(!err.to_string().contains(secret));
    }
}
