//! Session token issued by login and attached to every authenticated call.

pub mod store;

pub use store::{SessionToken, TokenStore};
