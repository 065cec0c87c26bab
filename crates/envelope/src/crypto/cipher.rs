//! AES-256-GCM-SIV sealing and opening of raw byte payloads.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-resistant.
//! A fresh random nonce is still drawn for every seal, so sealing the same
//! plaintext twice never yields the same envelope.

use std::fmt;
use std::str::FromStr;

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    Aes256GcmSiv, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

use crate::keys::{is_valid_key_id, KeyMaterial};

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the AEAD authentication tag.
pub const TAG_LEN: usize = 16;

/// Prefix that appears at the start of every envelope.
pub const VERSION_PREFIX: &str = "v1";

/// A parsed envelope.
///
/// The string representation is
/// `v1.<key-id>.<base64(nonce || ciphertext+tag)>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    /// Identifier of the key that sealed this envelope.
    pub key_id: String,
    /// Raw nonce bytes.
    pub nonce: [u8; NONCE_LEN],
    /// Raw ciphertext + authentication tag bytes.
    pub ciphertext: Vec<u8>,
}

impl SealedEnvelope {
    /// Associated data bound to the ciphertext: `v1.<key-id>`.
    fn header(&self) -> String {
        envelope_header(&self.key_id)
    }

    /// Parse an envelope string.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidFormat`] if the string does not match the
    /// `v1.<key-id>.<base64>` structure or is too short to hold a nonce and tag.
    pub fn parse(s: &str) -> Result<Self, CipherError> {
        let mut parts = s.splitn(3, '.');
        let (Some(version), Some(key_id), Some(encoded)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CipherError::InvalidFormat);
        };
        if version != VERSION_PREFIX || !is_valid_key_id(key_id) {
            return Err(CipherError::InvalidFormat);
        }

        let raw = STANDARD
            .decode(encoded)
            .map_err(|_| CipherError::InvalidFormat)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::InvalidFormat);
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);

        Ok(Self {
            key_id: key_id.to_owned(),
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

impl fmt::Display for SealedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        raw.extend_from_slice(&self.nonce);
        raw.extend_from_slice(&self.ciphertext);
        write!(f, "{}.{}", self.header(), STANDARD.encode(raw))
    }
}

impl FromStr for SealedEnvelope {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// The OS entropy source could not supply a nonce.
    #[error("entropy source unavailable")]
    EntropyUnavailable,

    /// AES-GCM-SIV encryption or decryption failed.
    #[error("aead operation failed")]
    AeadFailure,

    /// The envelope string does not match the expected format.
    #[error("invalid envelope format")]
    InvalidFormat,
}

/// Seal `plaintext` under `key`.
///
/// A random 96-bit nonce is drawn from the OS CSPRNG for every call.
///
/// # Errors
///
/// Returns [`CipherError::EntropyUnavailable`] if no nonce could be drawn and
/// [`CipherError::AeadFailure`] on an internal AEAD error.
pub fn seal_bytes(plaintext: &[u8], key: &KeyMaterial) -> Result<SealedEnvelope, CipherError> {
    let cipher = build_cipher(key)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|_| CipherError::EntropyUnavailable)?;

    let header = envelope_header(key.id());
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: header.as_bytes(),
            },
        )
        .map_err(|_| CipherError::AeadFailure)?;

    Ok(SealedEnvelope {
        key_id: key.id().to_owned(),
        nonce,
        ciphertext,
    })
}

/// Open a [`SealedEnvelope`] back to plaintext bytes.
///
/// # Errors
///
/// Returns [`CipherError::AeadFailure`] if authentication fails (wrong key,
/// relabelled key id, or tampered data).
pub fn open_bytes(envelope: &SealedEnvelope, key: &KeyMaterial) -> Result<Vec<u8>, CipherError> {
    let cipher = build_cipher(key)?;
    let header = envelope.header();
    cipher
        .decrypt(
            Nonce::from_slice(&envelope.nonce),
            Payload {
                msg: envelope.ciphertext.as_ref(),
                aad: header.as_bytes(),
            },
        )
        .map_err(|_| CipherError::AeadFailure)
}

fn envelope_header(key_id: &str) -> String {
    format!("{VERSION_PREFIX}.{key_id}")
}

fn build_cipher(key: &KeyMaterial) -> Result<Aes256GcmSiv, CipherError> {
    Aes256GcmSiv::new_from_slice(key.expose()).map_err(|_| CipherError::InvalidKeyLength)
}
