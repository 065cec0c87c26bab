//! Shared application state injected into every Axum handler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{ErrorPayload, ErrorResponse, SealedRequest};
use common::{EnvelopeLocation, ServiceError};
use envelope::{EnvelopeCodec, KeyProvider, Payload};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, warn};

use super::credentials::AdminAccount;
use super::records::{Collection, TrainerDirectory};
use super::sessions::{Session, SessionRegistry};
use crate::config::Config;

/// Response extension marking a body that already left through
/// [`AppState::sealed`].
#[derive(Debug, Clone, Copy)]
pub struct Sealed;

/// Application state shared across all request handlers.
///
/// All fields are `Arc`-backed so that Axum can clone the state for each
/// request without copying data.
#[derive(Clone)]
pub struct AppState {
    /// Opens request bodies and seals responses.
    pub codec: EnvelopeCodec,
    /// Live session tokens.
    pub sessions: SessionRegistry,
    /// The configured administrator.
    pub admin: Arc<AdminAccount>,
    /// Trainer accounts.
    pub trainers: TrainerDirectory,
    /// Batches, owned by trainers.
    pub batches: Collection,
    /// Topics, owned by trainers and attached to a batch.
    pub topics: Collection,
    /// Held while a topic is attached to a batch and while a batch is
    /// deleted with its topics, so no topic outlives its batch.
    pub batch_membership: Arc<Mutex<()>>,
}

impl AppState {
    /// Create state with empty stores.
    pub fn new(codec: EnvelopeCodec, admin: AdminAccount, session_ttl: Duration) -> Self {
        Self {
            codec,
            sessions: SessionRegistry::new(session_ttl),
            admin: Arc::new(admin),
            trainers: TrainerDirectory::new(),
            batches: Collection::new(),
            topics: Collection::new(),
            batch_membership: Arc::new(Mutex::new(())),
        }
    }

    /// Build state from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the key ring cannot be loaded.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let keys = KeyProvider::from_settings(&cfg.key_settings())
            .context("failed to load envelope keys")?;
        let admin = AdminAccount::new(&cfg.admin_username, &cfg.admin_password)
            .context("failed to prepare administrator account")?;
        Ok(Self::new(EnvelopeCodec::new(keys), admin, cfg.session_ttl()))
    }

    /// Open a `{ "body": "<envelope>" }` request body.
    ///
    /// An empty body opens to an empty payload.
    pub fn open(&self, body: &[u8]) -> Result<Payload, ServiceError> {
        if body.is_empty() {
            return Ok(Payload::new());
        }
        let sealed: SealedRequest = serde_json::from_slice(body)
            .map_err(|_| ServiceError::BadRequest("request body must carry an envelope".into()))?;
        self.codec.open_payload(&sealed.body).map_err(|e| {
            warn!(error = %e, "request envelope did not open");
            ServiceError::BadRequest("request body could not be processed".into())
        })
    }

    /// Resolve the session named by the raw authorization header.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<Session, ServiceError> {
        let token = session_token(headers).ok_or(ServiceError::Unauthorized)?;
        self.sessions
            .resolve(token)
            .await
            .ok_or(ServiceError::Unauthorized)
    }

    /// Seal `value` and place it at `location` in a response with `status`.
    pub fn sealed<T: Serialize + ?Sized>(
        &self,
        status: StatusCode,
        location: EnvelopeLocation,
        value: &T,
    ) -> Response {
        let mut response = match self.codec.seal(value) {
            Ok(envelope) => (status, Json(location.wrap(envelope))).into_response(),
            Err(e) => {
                error!(error = %e, "failed to seal response");
                let err = ErrorResponse::new("internal_error", "response could not be sealed");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(err)).into_response()
            }
        };
        // Resealing a failed seal would fail the same way.
        response.extensions_mut().insert(Sealed);
        response
    }

    /// Seal an error as `{ "data": <{ "error": msg }> }`.
    pub fn failure(&self, err: &ServiceError) -> Response {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if let ServiceError::Internal(detail) = err {
            error!(detail = %detail, "internal error");
        }
        self.sealed(
            status,
            EnvelopeLocation::NestedUnderData,
            &ErrorPayload::new(err.public_message()),
        )
    }

    /// Seal a handler outcome: `Ok` at `location` with `status`, `Err` as a
    /// sealed error.
    pub fn reply<T: Serialize>(
        &self,
        status: StatusCode,
        location: EnvelopeLocation,
        outcome: Result<T, ServiceError>,
    ) -> Response {
        match outcome {
            Ok(value) => self.sealed(status, location, &value),
            Err(err) => self.failure(&err),
        }
    }
}

/// The raw session token carried in the `authorization` header, if any.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use envelope::KeyMaterial;

    pub const TEST_KEY: [u8; 32] = [7u8; 32];

    pub fn codec() -> EnvelopeCodec {
        EnvelopeCodec::new(KeyProvider::new(
            KeyMaterial::new("primary", TEST_KEY).unwrap(),
        ))
    }

    pub fn state() -> AppState {
        AppState::new(
            codec(),
            AdminAccount::new("admin", "changeme").unwrap(),
            Duration::from_secs(60),
        )
    }
}
