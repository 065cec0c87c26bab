//! TLS termination with rustls.
//!
//! The certificate chain and private key are read from the PEM files named
//! by `TLS_CERT_PATH` and `TLS_KEY_PATH`. Each accepted connection is
//! handshaken with `tokio-rustls` and then served by hyper's auto
//! (HTTP/1 + HTTP/2) connection builder.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Build a [`rustls::ServerConfig`] from PEM-encoded certificate and private key bytes.
///
/// # Errors
///
/// Returns an error if the certificate or key cannot be parsed, or if rustls
/// rejects the configuration.
pub fn build_server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<ServerConfig>> {
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse TLS certificate chain")?;
    if certs.is_empty() {
        anyhow::bail!("no certificate found in PEM data");
    }

    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_pem))
        .context("failed to read TLS private key")?
        .context("no private key found in PEM data")?;

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .context("failed to select TLS protocol versions")?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .context("failed to build rustls ServerConfig")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Read the PEM files at `cert_path` and `key_path` and build a server config.
pub fn load_server_config(cert_path: &str, key_path: &str) -> Result<Arc<ServerConfig>> {
    let cert_pem = std::fs::read(cert_path)
        .with_context(|| format!("failed to read TLS certificate from {cert_path}"))?;
    let key_pem = std::fs::read(key_path)
        .with_context(|| format!("failed to read TLS private key from {key_path}"))?;
    build_server_config(&cert_pem, &key_pem)
}

/// Pause after an accept error that is not tied to a single connection
/// (e.g. `EMFILE`), giving the process a chance to free descriptors.
pub const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// How long in-flight connections may run after shutdown begins.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay before accepting again after `err`, or `None` when the error only
/// concerns the connection being accepted.
pub fn accept_backoff(err: &io::Error) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}

/// Accept TLS connections on `listener` and serve `router` until `shutdown`
/// resolves.
///
/// Accept, handshake and connection errors are logged and never stop the
/// loop. On shutdown, open connections are asked to finish their current
/// requests and are given up to [`DRAIN_TIMEOUT`] before being aborted.
pub async fn serve(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    router: Router,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let acceptor = TlsAcceptor::from(config);
    let (stop_tx, stop_rx) = watch::channel(());
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    match accept_backoff(&e) {
                        Some(pause) => {
                            warn!(error = %e, "accept failed; backing off");
                            time::sleep(pause).await;
                        }
                        None => debug!(error = %e, "connection dropped during accept"),
                    }
                    continue;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
            () = &mut shutdown => {
                info!("shutdown signal received; no longer accepting connections");
                break;
            }
        };

        let acceptor = acceptor.clone();
        let service = TowerToHyperService::new(router.clone());
        let mut stop = stop_rx.clone();
        connections.spawn(async move {
            let tls = tokio::select! {
                handshake = acceptor.accept(stream) => match handshake {
                    Ok(tls) => tls,
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "TLS handshake failed");
                        return;
                    }
                },
                _ = stop.changed() => return,
            };

            let builder = auto::Builder::new(TokioExecutor::new());
            let conn = builder.serve_connection(TokioIo::new(tls), service);
            tokio::pin!(conn);
            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = stop.changed() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(e) = result {
                debug!(peer = %peer, error = %e, "connection ended with error");
            }
        });
    }

    drop(listener);
    stop_tx.send_replace(());
    let draining = connections.len();
    if draining > 0 {
        info!(connections = draining, "draining open connections");
    }
    let drained = time::timeout(DRAIN_TIMEOUT, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            connections = connections.len(),
            "drain timed out; aborting remaining connections"
        );
        connections.shutdown().await;
    }
    Ok(())
}
