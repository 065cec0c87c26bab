//! Envelope key material and the process-wide key ring.
//!
//! # Lifecycle
//!
//! 1. At startup, [`KeyProvider::from_settings`] reads the active key (and any
//!    retired keys) from configuration. Absent or malformed material is fatal.
//! 2. The ring lives for the whole process and is handed to the codec by
//!    value (`KeyProvider` is a cheap `Arc` handle), never through a global.
//! 3. [`KeyProvider::rotate`] swaps in a new active key; the previous one is
//!    retired and keeps opening envelopes sealed before the swap.
//!
//! # Security invariants
//!
//! - Key bytes are never logged, formatted, or included in error messages.
//! - Key bytes are zeroed when the last handle to them is dropped.

pub mod material;
pub mod provider;

pub use material::{is_valid_key_id, Algorithm, KeyError, KeyMaterial};
pub use provider::{KeyProvider, KeySettings};
