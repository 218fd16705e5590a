//! Application wiring: listener, protocol router, gRPC service and the REST
//! gateway.
//!
//! - `services.rs`: storage backend, validator and gRPC routes
//! - `routes/`: REST handlers (one file per area)
//! - `dto.rs`: JSON request/response shapes
//! - `errors.rs`: gRPC status to JSON error mapping

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use companyhub_infra::config::ExternalApiConfig;

use crate::gateway::{Gateway, LoopbackTls};
use crate::middleware::Cors;
use crate::router::ProtocolRouter;
use crate::server;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// A listening API server.
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait for open connections to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.handle.await {
            tracing::error!(error = %err, "api server task failed");
        }
    }
}

/// Bind the listener, start serving gRPC, then install the REST gateway.
///
/// Until the gateway is installed, non-RPC requests are answered with
/// `501 Not Implemented`.
pub async fn start(config: &ExternalApiConfig, services: AppServices) -> anyhow::Result<RunningServer> {
    let tls = if config.tls_enabled() {
        Some(
            server::tls_acceptor(Path::new(&config.tls_cert), Path::new(&config.tls_key))
                .context("load external api tls")?,
        )
    } else {
        None
    };

    let listener = server::bind(&config.bind).await?;
    let local_addr = listener.local_addr().context("listener address")?;

    tracing::info!(
        bind = %config.bind,
        addr = %local_addr,
        tls_cert = %config.tls_cert,
        tls_key = %config.tls_key,
        "api/external: starting api server"
    );

    let router = ProtocolRouter::new(
        services.grpc_routes(),
        config.cors_origin().and_then(Cors::new),
    );
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server::serve(
        listener,
        tls,
        router.clone(),
        shutdown.clone(),
    ));

    let loopback_tls = config.tls_enabled().then(|| LoopbackTls {
        cert: Path::new(&config.tls_cert),
        server_name: &config.tls_server_name,
    });
    let gateway = match Gateway::connect(local_addr.port(), loopback_tls) {
        Ok(gateway) => gateway,
        Err(err) => {
            shutdown.cancel();
            return Err(err).context("setup json gateway");
        }
    };

    tracing::info!(path = "/api", "api/external: registering rest endpoints");
    router.install_rest(routes::router(gateway, PathBuf::from(&config.static_dir)));

    Ok(RunningServer {
        local_addr,
        shutdown,
        handle,
    })
}
