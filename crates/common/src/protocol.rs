//! Wire types exchanged between the console client and its backend.
//!
//! Every body crossing the network carries a sealed envelope string. Only the
//! envelope's position in the JSON body is described here; sealing and opening
//! live in the `envelope` crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message the backend seals into 401 responses.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Outbound request body: `{ "body": "<envelope>" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedRequest {
    /// Sealed JSON payload.
    pub body: String,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Response or error body carrying its envelope under `data`.
///
/// Unknown plaintext fields next to `data` are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedResponse {
    /// Sealed JSON payload.
    pub data: String,
}

/// Where a response body carries its envelope.
///
/// Call sites of the console disagree on this, so it is configured per
/// operation rather than guessed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeLocation {
    /// The whole body is a bare JSON string: `"<envelope>"`.
    TopLevel,
    /// The body is an object with the envelope under `data`.
    #[default]
    NestedUnderData,
}

impl EnvelopeLocation {
    /// Borrow the envelope string out of a parsed response body.
    ///
    /// Returns `None` if the body does not have the expected shape.
    pub fn extract<'a>(&self, body: &'a Value) -> Option<&'a str> {
        match self {
            EnvelopeLocation::TopLevel => body.as_str(),
            EnvelopeLocation::NestedUnderData => body.get("data")?.as_str(),
        }
    }

    /// Build a response body carrying `envelope` at this location.
    pub fn wrap(&self, envelope: String) -> Value {
        match self {
            EnvelopeLocation::TopLevel => Value::String(envelope),
            EnvelopeLocation::NestedUnderData => {
                serde_json::to_value(SealedResponse { data: envelope }).unwrap_or(Value::Null)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Opened payload shapes
// ---------------------------------------------------------------------------

/// Opened error payload: `{ "error": msg }` or `{ "message": msg }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Primary error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Alternative spelling used by some endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorPayload {
    /// Construct an [`ErrorPayload`] with the `error` field set.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            message: None,
        }
    }

    /// The recovered message, preferring `error` over `message`.
    pub fn into_message(self) -> Option<String> {
        self.error.or(self.message)
    }
}

/// Opened payload of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Opaque session token to attach to later calls.
    pub token: String,
    /// Role granted by the session, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

// ---------------------------------------------------------------------------
// Plaintext bodies
// ---------------------------------------------------------------------------

/// Plaintext error body used only when a response could not be sealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"internal_error"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: String,
    /// Number of live sessions.
    pub sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_top_level() {
        let body = json!("v1.primary.AAAA");
        assert_eq!(
            EnvelopeLocation::TopLevel.extract(&body),
            Some("v1.primary.AAAA")
        );
        assert_eq!(EnvelopeLocation::NestedUnderData.extract(&body), None);
    }

    #[test]
    fn extract_nested_ignores_extra_fields() {
        let body = json!({"status": 200, "data": "v1.primary.AAAA"});
        assert_eq!(
            EnvelopeLocation::NestedUnderData.extract(&body),
            Some("v1.primary.AAAA")
        );
        assert_eq!(EnvelopeLocation::TopLevel.extract(&body), None);
    }

    #[test]
    fn extract_rejects_non_string_data() {
        let body = json!({"data": {"token": "plaintext"}});
        assert_eq!(EnvelopeLocation::NestedUnderData.extract(&body), None);
    }

    #[test]
    fn wrap_matches_extract() {
        for location in [EnvelopeLocation::TopLevel, EnvelopeLocation::NestedUnderData] {
            let body = location.wrap("v1.k.Zm9v".into());
            assert_eq!(location.extract(&body), Some("v1.k.Zm9v"));
        }
    }

    #[test]
    fn default_location_is_nested() {
        assert_eq!(EnvelopeLocation::default(), EnvelopeLocation::NestedUnderData);
    }

    #[test]
    fn error_payload_prefers_error_field() {
        let p: ErrorPayload =
            serde_json::from_value(json!({"error": "Unauthorized", "message": "other"})).unwrap();
        assert_eq!(p.into_message().as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn error_payload_falls_back_to_message() {
        let p: ErrorPayload = serde_json::from_value(json!({"message": "Batch not found"})).unwrap();
        assert_eq!(p.into_message().as_deref(), Some("Batch not found"));
    }

    #[test]
    fn error_payload_serialises_only_error() {
        let v = serde_json::to_value(ErrorPayload::new("Forbidden")).unwrap();
        assert_eq!(v, json!({"error": "Forbidden"}));
    }

    #[test]
    fn login_response_role_is_optional() {
        let r: LoginResponse = serde_json::from_value(json!({"token": "abc"})).unwrap();
        assert_eq!(r.token, "abc");
        assert!(r.role.is_none());
    }
}
