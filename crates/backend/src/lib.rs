//! Reference backend for the sealed console API.
//!
//! Speaks the same envelope protocol as the `envelope` client: request
//! bodies are opened with the configured key ring, and every response and
//! error is sealed before it leaves the process.

pub mod config;
pub mod server;
pub mod telemetry;
