//! Configuration for the console client.
//!
//! All values are read from environment variables. Key material never
//! appears in `Debug` output.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use common::ConsoleError;
use serde::Deserialize;

use crate::keys::{provider::default_key_id, KeySettings};

/// Validated client configuration.
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    /// Absolute base URL of the console backend. **Required.**
    #[serde(default)]
    pub base_url: String,

    /// Base64 of the 32-byte active envelope key. **Required.**
    #[serde(default)]
    pub envelope_key: String,

    /// Key id written into sealed envelopes.
    #[serde(default = "default_key_id")]
    pub envelope_key_id: String,

    /// Retired keys (`id:base64,id:base64`) still accepted when opening.
    #[serde(default)]
    pub envelope_retired_keys: Option<String>,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl ClientConfig {
    /// Load and validate configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Config`] if a required variable is absent or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self, ConsoleError> {
        Self::from_source(config::Environment::default())
    }

    /// Load from an explicit variable map instead of the process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConsoleError> {
        Self::from_source(config::Environment::default().source(Some(vars)))
    }

    fn from_source(env: config::Environment) -> Result<Self, ConsoleError> {
        let cfg = config::Config::builder()
            .add_source(env)
            .build()
            .map_err(|e| ConsoleError::Config(format!("failed to read environment: {e}")))?;

        let c: ClientConfig = cfg
            .try_deserialize()
            .map_err(|e| ConsoleError::Config(format!("invalid configuration: {e}")))?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<(), ConsoleError> {
        if self.base_url.trim().is_empty() {
            return Err(ConsoleError::Config(
                "BASE_URL is required and must not be empty".into(),
            ));
        }
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(ConsoleError::Config(
                "BASE_URL must start with http:// or https://".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConsoleError::Config(
                "REQUEST_TIMEOUT_SECS must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// The key-related subset of this configuration.
    pub fn key_settings(&self) -> KeySettings {
        KeySettings {
            envelope_key: self.envelope_key.clone(),
            envelope_key_id: self.envelope_key_id.clone(),
            envelope_retired_keys: self.envelope_retired_keys.clone(),
        }
    }

    /// Timeout applied to each backend call.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("envelope_key", &"[REDACTED]")
            .field("envelope_key_id", &self.envelope_key_id)
            .field(
                "envelope_retired_keys",
                &self.envelope_retired_keys.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}
