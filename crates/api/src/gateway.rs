//! Loopback client the REST handlers use to re-issue calls as gRPC.
//!
//! Under TLS the loopback client pins the certificate the listener was
//! configured with: the peer's end-entity certificate must equal one read from
//! `tls_cert`, byte for byte. Handshake signatures are still verified. Chain
//! building is skipped, so self-signed CA certificates and leaves served
//! without their issuer both work.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::HeaderMap;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{self, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, InvalidDnsNameError, ServerName, UnixTime};
use tokio_rustls::rustls::{
    self, CertificateError, ClientConfig, DigitallySignedStruct, SignatureScheme,
};
use tokio_rustls::TlsConnector;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint, Uri};

use crate::pb::company_service_client::CompanyServiceClient;
use crate::rpc::AUTHORIZATION_METADATA;
use crate::server::{certs_from_pem, ServerError};

/// Header the JSON side uses for the token, as grpc-gateway clients send it.
pub const GATEWAY_AUTHORIZATION_HEADER: &str = "grpc-metadata-authorization";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("external api tls cert: {0}")]
    Certificate(#[from] ServerError),

    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("tls server name: {0}")]
    ServerName(#[from] InvalidDnsNameError),

    #[error("loopback tls config: {0}")]
    Tls(#[from] rustls::Error),

    #[error("loopback endpoint: {0}")]
    Endpoint(#[from] tonic::transport::Error),
}

/// TLS posture of the loopback connection.
#[derive(Debug, Clone)]
pub struct LoopbackTls<'a> {
    /// Certificate served by the listener; pinned, not chain-validated.
    pub cert: &'a Path,
    /// Sent as SNI.
    pub server_name: &'a str,
}

#[derive(Debug, Clone)]
pub struct Gateway {
    client: CompanyServiceClient<Channel>,
}

impl Gateway {
    /// Client for `localhost:<port>`. The connection is established on first
    /// use, so this may run before the listener accepts.
    pub fn connect(port: u16, tls: Option<LoopbackTls<'_>>) -> Result<Self, GatewayError> {
        let channel = match tls {
            None => Endpoint::from_shared(format!("http://localhost:{port}"))?.connect_lazy(),
            Some(tls) => {
                let pem = std::fs::read(tls.cert).map_err(|source| GatewayError::Read {
                    path: tls.cert.to_path_buf(),
                    source,
                })?;
                let pinned = certs_from_pem(tls.cert, &pem)?;
                let connector = pinned_connector(pinned)?;
                let server_name = ServerName::try_from(tls.server_name.to_string())?;

                // The connector performs the handshake; tonic sees a plain
                // stream, so the endpoint keeps the `http` scheme.
                Endpoint::from_shared(format!("http://localhost:{port}"))?
                    .connect_with_connector_lazy(tower::service_fn(move |uri: Uri| {
                        let connector = connector.clone();
                        let server_name = server_name.clone();
                        async move {
                            let authority = uri
                                .authority()
                                .map(|a| a.as_str().to_string())
                                .ok_or("loopback uri has no authority")?;
                            let tcp = TcpStream::connect(authority).await?;
                            let stream = connector.connect(server_name, tcp).await?;
                            Ok::<_, BoxError>(TokioIo::new(stream))
                        }
                    }))
            }
        };

        Ok(Self {
            client: CompanyServiceClient::new(channel),
        })
    }

    pub fn client(&self) -> CompanyServiceClient<Channel> {
        self.client.clone()
    }

    /// Wrap `message`, forwarding the caller's token as `authorization`
    /// metadata.
    pub fn request<T>(&self, headers: &HeaderMap, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        if let Some(token) = forwarded_token(headers) {
            match MetadataValue::try_from(token) {
                Ok(value) => {
                    request.metadata_mut().insert(AUTHORIZATION_METADATA, value);
                }
                Err(_) => tracing::debug!("dropping unprintable authorization header"),
            }
        }
        request
    }
}

fn pinned_connector(pinned: Vec<CertificateDer<'static>>) -> Result<TlsConnector, GatewayError> {
    let provider = Arc::new(crypto::ring::default_provider());
    let verifier = PinnedCertVerifier {
        pinned,
        provider: provider.clone(),
    };
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Accepts exactly the configured certificates.
#[derive(Debug)]
struct PinnedCertVerifier {
    pinned: Vec<CertificateDer<'static>>,
    provider: Arc<CryptoProvider>,
}

impl PinnedCertVerifier {
    fn is_pinned(&self, end_entity: &CertificateDer<'_>) -> bool {
        self.pinned
            .iter()
            .any(|cert| cert.as_ref() == end_entity.as_ref())
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self.is_pinned(end_entity) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::UnknownIssuer,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// `Grpc-Metadata-Authorization`, falling back to plain `Authorization`.
pub fn forwarded_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(GATEWAY_AUTHORIZATION_HEADER)
        .or_else(|| headers.get(axum::http::header::AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
}
