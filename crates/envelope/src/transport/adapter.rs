//! [`TransportAdapter`]: seal → send → open, around every console call.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use common::protocol::{ErrorPayload, LoginResponse, SealedRequest, SealedResponse};
use common::ConsoleError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::exchange::{HttpExchange, HyperExchange, OutboundRequest, RawResponse};
use super::operation::{ConsoleOperation, Operation};
use crate::config::ClientConfig;
use crate::crypto::{EnvelopeCodec, Payload};
use crate::keys::KeyProvider;
use crate::session::{SessionToken, TokenStore};

/// Message used when a 401 carries no openable error body.
const GENERIC_UNAUTHORIZED: &str = "unauthorized";

/// Wraps the codec and token store around each outbound call.
///
/// Cheap to clone; clones share the key ring, token store, and connection
/// pool.
#[derive(Clone)]
pub struct TransportAdapter {
    codec: EnvelopeCodec,
    tokens: TokenStore,
    exchange: Arc<dyn HttpExchange>,
}

impl TransportAdapter {
    /// Assemble an adapter from explicitly owned parts.
    pub fn new(codec: EnvelopeCodec, tokens: TokenStore, exchange: Arc<dyn HttpExchange>) -> Self {
        Self {
            codec,
            tokens,
            exchange,
        }
    }

    /// Build the key ring and HTTPS exchange described by `cfg`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::KeyUnavailable`] if key material is absent or
    /// malformed and [`ConsoleError::Config`] if the base URL is unusable.
    pub fn from_config(cfg: &ClientConfig) -> Result<Self, ConsoleError> {
        let keys = KeyProvider::from_settings(&cfg.key_settings())
            .map_err(|e| ConsoleError::KeyUnavailable(e.to_string()))?;
        let exchange = HyperExchange::new(&cfg.base_url, cfg.request_timeout())
            .map_err(|e| ConsoleError::Config(e.to_string()))?;
        Ok(Self::new(
            EnvelopeCodec::new(keys),
            TokenStore::new(),
            Arc::new(exchange),
        ))
    }

    /// The session token store this adapter reads from.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// The codec this adapter seals and opens with.
    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    /// Perform `op` with `payload` and return the opened response payload.
    pub async fn call(
        &self,
        op: impl Into<Operation>,
        payload: &Payload,
    ) -> Result<Payload, ConsoleError> {
        self.call_as(op, payload).await
    }

    /// Perform `op` with any serialisable payload and open the response as `T`.
    ///
    /// # Errors
    ///
    /// - [`ConsoleError::Seal`] if the payload could not be sealed (nothing is sent).
    /// - [`ConsoleError::Transport`] on network failure or an unopenable error body.
    /// - [`ConsoleError::Authentication`] if the backend answers 401. This
    ///   holds even when the 401 body does not open: the status alone ends
    ///   the session, so the sent token is cleared and the message falls back
    ///   to `"unauthorized"` instead of surfacing a transport failure.
    /// - [`ConsoleError::Rejected`] for any other verified error response.
    /// - [`ConsoleError::Decryption`] / [`ConsoleError::MalformedPayload`] if
    ///   a success response does not open.
    pub async fn call_as<T, P>(&self, op: impl Into<Operation>, payload: &P) -> Result<T, ConsoleError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let op = op.into();
        let body = self.sealed_body(&op, payload)?;

        // Read once: the same token is sent and, on 401, invalidated.
        let sent_token = if op.requires_auth() {
            self.tokens.get()
        } else {
            None
        };
        if op.requires_auth() && sent_token.is_none() {
            debug!(operation = op.name(), "no session token stored; sending unauthenticated");
        }

        let request = OutboundRequest {
            method: op.method().clone(),
            path: op.path().to_owned(),
            authorization: sent_token.as_ref().map(|t| t.as_str().to_owned()),
            body,
        };

        let started = Instant::now();
        let response = self.exchange.exchange(request).await.map_err(|e| {
            warn!(operation = op.name(), error = %e, "exchange failed");
            ConsoleError::Transport(e.to_string())
        })?;
        debug!(
            operation = op.name(),
            method = %op.method(),
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "exchange complete"
        );

        if response.is_success() {
            self.open_success(&op, &response.body)
        } else {
            Err(self.open_failure(&op, response, sent_token))
        }
    }

    /// Log in with `credentials` and store the returned token.
    ///
    /// `op` is normally [`ConsoleOperation::AdminLogin`] or
    /// [`ConsoleOperation::TrainerLogin`].
    ///
    /// # Errors
    ///
    /// Any [`ConsoleError`] from the call, or
    /// [`ConsoleError::MalformedPayload`] if the opened payload has no
    /// non-empty `token`.
    pub async fn login(
        &self,
        op: impl Into<Operation>,
        credentials: &Payload,
    ) -> Result<SessionToken, ConsoleError> {
        let op = op.into();
        let response: LoginResponse = self.call_as(op.clone(), credentials).await?;
        if response.token.is_empty() {
            return Err(ConsoleError::MalformedPayload(
                "login response carries an empty token".into(),
            ));
        }
        let token = SessionToken::new(response.token);
        self.tokens.set(token.clone());
        info!(operation = op.name(), role = ?response.role, "session established");
        Ok(token)
    }

    /// End the session.
    ///
    /// The local token is cleared whether or not the backend call succeeds;
    /// a backend failure is still returned.
    pub async fn logout(&self) -> Result<(), ConsoleError> {
        let result = self.call(ConsoleOperation::Logout, &Payload::new()).await;
        self.tokens.clear();
        match &result {
            Ok(_) => info!("session ended"),
            Err(e) => warn!(error = %e, "logout call failed; local session cleared"),
        }
        result.map(|_| ())
    }

    fn sealed_body<P: Serialize + ?Sized>(
        &self,
        op: &Operation,
        payload: &P,
    ) -> Result<Option<Bytes>, ConsoleError> {
        if !op.carries_body() {
            let value = serde_json::to_value(payload).map_err(|e| ConsoleError::Seal(e.to_string()))?;
            let empty = match &value {
                Value::Null => true,
                Value::Object(map) => map.is_empty(),
                _ => false,
            };
            if !empty {
                return Err(ConsoleError::Seal(format!(
                    "{} requests cannot carry a payload",
                    op.method()
                )));
            }
            return Ok(None);
        }

        let envelope = self.codec.seal(payload)?;
        let body = serde_json::to_vec(&SealedRequest { body: envelope })
            .map_err(|e| ConsoleError::Seal(e.to_string()))?;
        Ok(Some(Bytes::from(body)))
    }

    fn open_success<T: DeserializeOwned>(&self, op: &Operation, body: &[u8]) -> Result<T, ConsoleError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| {
            ConsoleError::MalformedPayload("response body is not JSON".into())
        })?;
        let envelope = op.envelope().extract(&value).ok_or_else(|| {
            warn!(operation = op.name(), location = ?op.envelope(), "response carries no envelope");
            ConsoleError::MalformedPayload(format!(
                "response carries no envelope at {:?}",
                op.envelope()
            ))
        })?;
        self.codec.open(envelope).map_err(|e| {
            warn!(operation = op.name(), error = %e, "response envelope did not open");
            ConsoleError::from(e)
        })
    }

    fn open_failure(
        &self,
        op: &Operation,
        response: RawResponse,
        sent_token: Option<Arc<SessionToken>>,
    ) -> ConsoleError {
        let message = self.recover_error_message(&response.body);

        if response.status == 401 {
            if let Some(token) = sent_token {
                if self.tokens.clear_if(&token) {
                    info!(operation = op.name(), "session token rejected and cleared");
                }
            }
            return ConsoleError::Authentication(
                message.unwrap_or_else(|| GENERIC_UNAUTHORIZED.into()),
            );
        }

        match message {
            Some(message) => ConsoleError::Rejected {
                status: response.status,
                message,
            },
            None => {
                warn!(
                    operation = op.name(),
                    status = response.status,
                    "error response carried no openable envelope"
                );
                ConsoleError::Transport(format!("request failed with status {}", response.status))
            }
        }
    }

    /// Open `{ "data": "<envelope>" }` into an error message, if possible.
    fn recover_error_message(&self, body: &[u8]) -> Option<String> {
        let sealed: SealedResponse = serde_json::from_slice(body).ok()?;
        let payload: ErrorPayload = self.codec.open(&sealed.data).ok()?;
        payload.into_message()
    }
}

impl std::fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("codec", &self.codec)
            .field("authenticated", &self.tokens.is_authenticated())
            .finish()
    }
}
