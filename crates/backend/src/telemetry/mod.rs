//! Structured logging and optional OpenTelemetry span export.
//!
//! Logs are JSON lines on stdout. When `OTEL_EXPORTER_OTLP_ENDPOINT` is set,
//! spans are also exported via OTLP/gRPC.
//!
//! # Telemetry invariants
//!
//! - **No key material, session tokens, or request/response payloads** may
//!   appear in any span attribute or log field.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//!   takes precedence when set.

pub mod init;

pub use init::{init_telemetry, shutdown_telemetry};
