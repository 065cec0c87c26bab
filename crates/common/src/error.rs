//! Error taxonomy shared across crates.

use thiserror::Error;

use crate::protocol::UNAUTHORIZED_MESSAGE;

/// Failure surfaced to console feature code by the sealed transport.
///
/// None of these are retried by the transport layer. Messages never contain
/// key material, session tokens, or decrypted plaintext.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// No usable key material was configured. Fatal at startup.
    #[error("key material unavailable: {0}")]
    KeyUnavailable(String),

    /// Sealing the outbound payload failed; nothing was sent.
    #[error("sealing failed: {0}")]
    Seal(String),

    /// An envelope did not verify (tampered, wrong key, or not an envelope).
    #[error("cannot process response")]
    Decryption,

    /// The envelope verified but its plaintext is not the expected JSON.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The counterpart rejected the (absent, expired, or revoked) session token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The counterpart returned a verified error for any other non-2xx status.
    #[error("request rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status returned by the counterpart.
        status: u16,
        /// Message recovered from the sealed error body.
        message: String,
    },

    /// Network failure, or an error response whose body could not be opened.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Invalid non-key configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ConsoleError {
    /// Returns `true` if the counterpart refused the session.
    pub fn is_authentication(&self) -> bool {
        matches!(self, ConsoleError::Authentication(_))
    }
}

/// Error type returned by the reference backend's handlers.
///
/// Variants map to HTTP status codes:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::Unauthorized`] → 401
/// - [`ServiceError::Forbidden`] → 403
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::Conflict`] → 409
/// - [`ServiceError::Internal`] → 500
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request body was missing, could not be opened, or failed validation.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No valid session token accompanied the request.
    #[error("Unauthorized")]
    Unauthorized,

    /// The session is valid but lacks the role or ownership required.
    #[error("Forbidden")]
    Forbidden,

    /// The addressed record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with existing state (e.g. duplicate username).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::Unauthorized => 401,
            ServiceError::Forbidden => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Message placed inside the sealed `{ "error": ... }` body.
    ///
    /// Internal details are not exposed to callers.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::BadRequest(m) | ServiceError::NotFound(m) | ServiceError::Conflict(m) => {
                m.clone()
            }
            ServiceError::Unauthorized => UNAUTHORIZED_MESSAGE.into(),
            ServiceError::Forbidden => "Forbidden".into(),
            ServiceError::Internal(_) => "Internal server error".into(),
        }
    }
}
