//! Sealed calls to the console backend.
//!
//! # Responsibilities
//! - Describe every console operation: method, path, auth requirement, and
//!   where its response carries the envelope ([`operation`]).
//! - Move raw request/response bytes over HTTP(S) ([`exchange`]).
//! - Seal, attach the session token, send, and open ([`adapter`]).

pub mod adapter;
pub mod exchange;
pub mod operation;

pub use adapter::TransportAdapter;
pub use exchange::{ExchangeError, HttpExchange, HyperExchange, OutboundRequest, RawResponse};
pub use operation::{ConsoleOperation, Operation};
