//! Listener, optional TLS termination and the connection accept loop.
//!
//! Each accepted connection is served on its own task by hyper-util's `auto`
//! builder, which detects HTTP/1.1 or HTTP/2 (prior knowledge on cleartext,
//! ALPN under TLS). Cancelling the shutdown token stops accepting and asks
//! open connections to finish gracefully.

use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::http::Request;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, ServerConfig};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::router::ProtocolRouter;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("read {}: {source}", path.display())]
    ReadPem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} contains no certificate", .0.display())]
    NoCertificate(PathBuf),

    #[error("{} contains no private key", .0.display())]
    NoPrivateKey(PathBuf),

    #[error("tls config: {0}")]
    Tls(#[from] rustls::Error),
}

pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Every certificate in a PEM file; an empty file is an error.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let pem = std::fs::read(path).map_err(|source| ServerError::ReadPem {
        path: path.to_path_buf(),
        source,
    })?;
    certs_from_pem(path, &pem)
}

/// Parse certificates already read from `path`.
pub fn certs_from_pem(path: &Path, pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ServerError::ReadPem {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(ServerError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let read_err = |source| ServerError::ReadPem {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(read_err)?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(read_err)?
        .ok_or_else(|| ServerError::NoPrivateKey(path.to_path_buf()))
}

/// Server-side TLS with ALPN `h2` and `http/1.1`.
pub fn tls_acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor, ServerError> {
    let certs = load_certs(cert)?;
    let key = load_private_key(key)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accept connections until `shutdown` is cancelled, then wait for the open
/// ones to close.
pub async fn serve(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    router: ProtocolRouter,
    shutdown: CancellationToken,
) {
    let connections = TaskTracker::new();
    let builder = auto::Builder::new(TokioExecutor::new());

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    back_off_after_accept_error(&err).await;
                    continue;
                }
            },
            _ = shutdown.cancelled() => break,
        };

        let builder = builder.clone();
        let router = router.clone();
        let tls = tls.clone();
        let shutdown = shutdown.clone();
        connections.spawn(async move {
            match tls {
                None => serve_connection(builder, stream, peer, router, shutdown).await,
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => serve_connection(builder, stream, peer, router, shutdown).await,
                    Err(err) => tracing::debug!(peer = %peer, error = %err, "tls handshake failed"),
                },
            }
        });
    }

    tracing::info!("api: listener closed, waiting for open connections");
    connections.close();
    connections.wait().await;
}

// EMFILE and friends persist, so a failed accept waits before the next one.
async fn back_off_after_accept_error(err: &std::io::Error) {
    tracing::warn!(error = %err, "accept failed");
    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
}

async fn serve_connection<S>(
    builder: auto::Builder<TokioExecutor>,
    stream: S,
    peer: SocketAddr,
    router: ProtocolRouter,
    shutdown: CancellationToken,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
        let router = router.clone();
        async move { Ok::<_, Infallible>(router.handle(request).await) }
    });

    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(err) = result {
                    tracing::debug!(peer = %peer, error = %err, "connection closed with error");
                }
                break;
            }
            _ = shutdown.cancelled(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}
