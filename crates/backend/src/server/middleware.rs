//! Router-wide limits and the layer that keeps error responses sealed.
//!
//! Handlers seal their own replies, but some failures never reach a handler:
//! body-limit (413) and path (400) rejections, method mismatches (405), and
//! timeouts (408). [`seal_bare_errors`] wraps those the same way
//! [`AppState::failure`] would.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::header::ALLOW,
    middleware::Next,
    response::Response,
};
use common::protocol::ErrorPayload;
use common::EnvelopeLocation;
use tracing::warn;

use super::state::{AppState, Sealed};

/// Per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest accepted request body.
///
/// A profile image travels as a data URL inside a sealed envelope, so it is
/// base64-encoded twice; 16 MiB admits images up to roughly 8 MiB.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Seal any 4xx/5xx response that did not come from [`AppState::sealed`].
pub async fn seal_bare_errors(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error())
        || response.extensions().get::<Sealed>().is_some()
    {
        return response;
    }

    warn!(status = status.as_u16(), "sealing rejection raised outside a handler");
    let message = status.canonical_reason().unwrap_or("Request failed");
    let mut sealed = state.sealed(
        status,
        EnvelopeLocation::NestedUnderData,
        &ErrorPayload::new(message),
    );
    if let Some(allow) = response.headers().get(ALLOW) {
        sealed.headers_mut().insert(ALLOW, allow.clone());
    }
    sealed
}
