//! Common types, wire formats, and errors shared by the console client and
//! the reference backend.

pub mod error;
pub mod protocol;

pub use error::{ConsoleError, ServiceError};
pub use protocol::EnvelopeLocation;
