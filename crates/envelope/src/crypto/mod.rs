//! AES-256-GCM-SIV envelope primitives and the JSON codec built on them.
//!
//! This module is free of HTTP dependencies.
//!
//! # Envelope format
//!
//! ```text
//! v1.<key-id>.<base64-standard-padded(nonce || ciphertext || tag)>
//! ```
//!
//! The `v1.<key-id>` header is bound to the ciphertext as associated data,
//! so an envelope relabelled with another key id fails authentication.

pub mod cipher;
pub mod codec;

pub use cipher::{SealedEnvelope, KEY_LEN};
pub use codec::{CodecError, EnvelopeCodec, Payload};
