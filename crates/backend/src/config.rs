//! Configuration loading and validation for the console backend.
//!
//! All values are read from environment variables at startup. The process
//! exits with a clear error message if any required variable is missing or
//! invalid.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use envelope::keys::KeySettings;
use serde::Deserialize;

/// Validated backend configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Port the HTTP(S) server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Base64 of the 32-byte active envelope key. **Required.**
    #[serde(default)]
    pub envelope_key: String,

    /// Key id written into sealed envelopes.
    #[serde(default = "default_key_id")]
    pub envelope_key_id: String,

    /// Retired keys (`id:base64,id:base64`) still accepted when opening.
    #[serde(default)]
    pub envelope_retired_keys: Option<String>,

    /// Administrator login name. **Required.**
    #[serde(default)]
    pub admin_username: String,

    /// Administrator password. **Required.**
    #[serde(default)]
    pub admin_password: String,

    /// Session lifetime, in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// PEM certificate chain. TLS is enabled when this and
    /// `tls_key_path` are both set.
    #[serde(default)]
    pub tls_cert_path: Option<String>,

    /// PEM private key.
    #[serde(default)]
    pub tls_key_path: Option<String>,

    /// OTLP collector endpoint. Spans are exported only when set.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_port() -> u16 {
    8080
}
fn default_key_id() -> String {
    "primary".into()
}
fn default_session_ttl() -> u64 {
    3600
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_source(config::Environment::default())
    }

    /// Load from an explicit variable map instead of the process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_source(config::Environment::default().source(Some(vars)))
    }

    fn from_source(env: config::Environment) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(env)
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.envelope_key, "ENVELOPE_KEY")?;
        ensure_non_empty(&self.admin_username, "ADMIN_USERNAME")?;
        ensure_non_empty(&self.admin_password, "ADMIN_PASSWORD")?;

        if self.session_ttl_secs == 0 {
            anyhow::bail!("SESSION_TTL_SECS must be > 0");
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            anyhow::bail!("TLS_CERT_PATH and TLS_KEY_PATH must be set together");
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

    /// How long an issued session stays valid.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Certificate and key paths, when TLS is configured.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen_port", &self.listen_port)
            .field("envelope_key", &"[REDACTED]")
            .field("envelope_key_id", &self.envelope_key_id)
            .field(
                "envelope_retired_keys",
                &self.envelope_retired_keys.as_ref().map(|_| "[REDACTED]"),
            )
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"[REDACTED]")
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("tls_cert_path", &self.tls_cert_path)
            .field("tls_key_path", &self.tls_key_path)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
