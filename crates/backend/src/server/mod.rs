//! Axum server for the sealed console API.
//!
//! # Responsibilities
//! - Open every request envelope and seal every response and error.
//! - Issue, check, and revoke session tokens.
//! - Serve trainer, batch, and topic records from memory.
//! - Bind the listener, with TLS when certificate paths are configured.

pub mod credentials;
pub mod handlers;
pub mod middleware;
pub mod records;
pub mod router;
pub mod sessions;
pub mod state;
pub mod tls;
