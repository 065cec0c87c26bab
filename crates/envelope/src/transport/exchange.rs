//! Raw HTTP exchange between the adapter and the backend.
//!
//! The adapter only needs "send these bytes, give me the status and body
//! back", including bodies of non-2xx responses. [`HttpExchange`] is that
//! seam; [`HyperExchange`] is the production implementation over a pooled
//! `hyper-util` client with `hyper-rustls` (webpki roots, ring provider).

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{
    header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method, Request,
};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::time;

/// A fully prepared outbound request.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the base URL, starting with `/`.
    pub path: String,
    /// Raw session token for the authorization header.
    pub authorization: Option<String>,
    /// JSON body, already sealed.
    pub body: Option<Bytes>,
}

/// Status and raw body of a response, whatever the status.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body bytes (possibly empty).
    pub body: Bytes,
}

impl RawResponse {
    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors produced before a response body was received.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The request could not be built (bad base URL, header value, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// TLS could not be configured.
    #[error("tls setup failed: {0}")]
    Tls(String),

    /// Connecting or sending failed.
    #[error("request failed: {0}")]
    Send(String),

    /// Reading the response body failed.
    #[error("failed to read response body: {0}")]
    Body(String),

    /// No response within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Sends one request and returns the raw response.
///
/// Implementations must deliver bodies of non-2xx responses instead of
/// turning them into errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpExchange: Send + Sync {
    /// Perform the request.
    async fn exchange(&self, request: OutboundRequest) -> Result<RawResponse, ExchangeError>;
}

/// [`HttpExchange`] over HTTPS (or plain HTTP for local backends).
#[derive(Clone)]
pub struct HyperExchange {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    base_url: String,
    timeout: Duration,
}

impl HyperExchange {
    /// Create an exchange targeting `base_url` (e.g. `https://api.example.com`).
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::InvalidRequest`] if `base_url` is not an
    /// absolute `http`/`https` URL, or [`ExchangeError::Tls`] if the TLS
    /// connector cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ExchangeError> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        let uri: hyper::Uri = base_url
            .parse()
            .map_err(|e| ExchangeError::InvalidRequest(format!("base url: {e}")))?;
        if !matches!(uri.scheme_str(), Some("http") | Some("https")) || uri.host().is_none() {
            return Err(ExchangeError::InvalidRequest(
                "base url must be an absolute http(s) URL".into(),
            ));
        }

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| ExchangeError::Tls(e.to_string()))?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn build(&self, request: OutboundRequest) -> Result<Request<Full<Bytes>>, ExchangeError> {
        let mut builder = Request::builder()
            .method(request.method)
            .uri(format!("{}{}", self.base_url, request.path))
            .header(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = request.authorization {
            let mut value = HeaderValue::from_str(&token).map_err(|_| {
                ExchangeError::InvalidRequest("session token is not a valid header value".into())
            })?;
            value.set_sensitive(true);
            builder = builder.header(AUTHORIZATION, value);
        }

        let body = match request.body {
            Some(bytes) => {
                builder = builder.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Full::new(bytes)
            }
            None => Full::new(Bytes::new()),
        };

        builder
            .body(body)
            .map_err(|e| ExchangeError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl HttpExchange for HyperExchange {
    async fn exchange(&self, request: OutboundRequest) -> Result<RawResponse, ExchangeError> {
        let request = self.build(request)?;

        let response = time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| ExchangeError::Timeout(self.timeout))?
            .map_err(|e| ExchangeError::Send(e.to_string()))?;

        let status = response.status().as_u16();
        let body = time::timeout(self.timeout, response.into_body().collect())
            .await
            .map_err(|_| ExchangeError::Timeout(self.timeout))?
            .map_err(|e| ExchangeError::Body(e.to_string()))?
            .to_bytes();

        Ok(RawResponse { status, body })
    }
}

impl std::fmt::Debug for HyperExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperExchange")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}
