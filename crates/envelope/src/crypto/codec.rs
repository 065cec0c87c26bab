//! [`EnvelopeCodec`]: JSON payloads in, envelope strings out, and back.

use common::ConsoleError;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use super::cipher::{open_bytes, seal_bytes, CipherError, SealedEnvelope};
use crate::keys::KeyProvider;

/// An ordered mapping of string keys to JSON values.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Errors produced while sealing or opening payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload could not be serialised or encrypted; nothing was sealed.
    #[error("sealing failed: {0}")]
    Seal(String),

    /// The input is not a well-formed envelope string.
    #[error("envelope is not well-formed")]
    InvalidEnvelope,

    /// The envelope names a key id this process does not hold.
    #[error("envelope sealed under unknown key {0:?}")]
    UnknownKey(String),

    /// The authentication tag did not verify.
    #[error("envelope failed authentication")]
    Decryption,

    /// The envelope verified but its plaintext is not the expected JSON.
    #[error("decrypted payload is malformed: {0}")]
    MalformedPayload(String),
}

impl From<CodecError> for ConsoleError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Seal(msg) => ConsoleError::Seal(msg),
            CodecError::InvalidEnvelope | CodecError::UnknownKey(_) | CodecError::Decryption => {
                ConsoleError::Decryption
            }
            CodecError::MalformedPayload(msg) => ConsoleError::MalformedPayload(msg),
        }
    }
}

/// Seals and opens JSON payloads with the keys of a [`KeyProvider`].
///
/// Stateless apart from the shared key ring; safe to clone and use from many
/// tasks at once.
#[derive(Clone, Debug)]
pub struct EnvelopeCodec {
    keys: KeyProvider,
}

impl EnvelopeCodec {
    /// Create a codec over `keys`.
    pub fn new(keys: KeyProvider) -> Self {
        Self { keys }
    }

    /// The key ring this codec seals and opens with.
    pub fn keys(&self) -> &KeyProvider {
        &self.keys
    }

    /// Serialise `value` to JSON and seal it under the active key.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Seal`] if serialisation fails or no nonce could
    /// be drawn.
    pub fn seal<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, CodecError> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(value).map_err(|e| CodecError::Seal(e.to_string()))?,
        );
        let key = self.keys.current_key();
        let sealed = seal_bytes(&plaintext, &key).map_err(|e| match e {
            CipherError::EntropyUnavailable => CodecError::Seal("entropy source unavailable".into()),
            other => CodecError::Seal(other.to_string()),
        })?;
        Ok(sealed.to_string())
    }

    /// Open `envelope` and parse its plaintext as `T`.
    ///
    /// Fails closed: no plaintext is returned unless the tag verifies and
    /// the whole plaintext parses.
    ///
    /// # Errors
    ///
    /// - [`CodecError::InvalidEnvelope`] if `envelope` is not an envelope.
    /// - [`CodecError::UnknownKey`] if its key id is not in the ring.
    /// - [`CodecError::Decryption`] if the tag does not verify.
    /// - [`CodecError::MalformedPayload`] if the plaintext is not valid JSON
    ///   of the requested shape.
    pub fn open<T: DeserializeOwned>(&self, envelope: &str) -> Result<T, CodecError> {
        let sealed = SealedEnvelope::parse(envelope).map_err(|_| CodecError::InvalidEnvelope)?;
        let key = self
            .keys
            .key_for(&sealed.key_id)
            .ok_or_else(|| CodecError::UnknownKey(sealed.key_id.clone()))?;
        let plaintext =
            Zeroizing::new(open_bytes(&sealed, &key).map_err(|_| CodecError::Decryption)?);
        serde_json::from_slice(&plaintext).map_err(|e| CodecError::MalformedPayload(describe(&e)))
    }

    /// Seal a [`Payload`].
    pub fn seal_payload(&self, payload: &Payload) -> Result<String, CodecError> {
        self.seal(payload)
    }

    /// Open an envelope whose plaintext must be a JSON object.
    pub fn open_payload(&self, envelope: &str) -> Result<Payload, CodecError> {
        self.open(envelope)
    }
}

/// Describe a JSON error by category and position only.
///
/// `serde_json` messages can quote the offending input, which here is
/// decrypted plaintext.
fn describe(e: &serde_json::Error) -> String {
    format!(
        "{:?} error at line {} column {}",
        e.classify(),
        e.line(),
        e.column()
    )
}
