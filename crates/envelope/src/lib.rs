//! Sealed transport for the training console.
//!
//! Every request body is sealed before it leaves the process and every
//! response body is opened on arrival:
//!
//! ```text
//! caller ─► serialise ─► seal ─► network ─► (backend) ─► network ─► open ─► caller
//! ```
//!
//! - [`crypto`]: AES-256-GCM-SIV envelope cipher and the JSON codec on top.
//! - [`keys`]: key material and the rotating key ring.
//! - [`session`]: the session token store filled by login.
//! - [`transport`]: operation catalogue, HTTP exchange, and the adapter that
//!   ties everything together.
//! - [`config`]: environment-driven client configuration.

pub mod config;
pub mod crypto;
pub mod keys;
pub mod session;
pub mod transport;

pub use crypto::{CodecError, EnvelopeCodec, Payload};
pub use keys::{KeyMaterial, KeyProvider};
pub use session::{SessionToken, TokenStore};
pub use transport::{ConsoleOperation, Operation, TransportAdapter};
