//! TCP and TLS transport to the adapter
//!
//! The dial, including the TLS handshake, runs under a single deadline of
//! `ElmConfig::timeout`. There are no retries; the caller owns retry policy.

use crate::config::{ElmConfig, TlsOptions, TlsVersion};
use crate::error::ElmError;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info, warn};

/// Byte stream to an adapter, plain or TLS
pub trait DeviceStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DeviceStream for T {}

/// Open a stream to the adapter described by `config`
pub async fn connect(config: &ElmConfig) -> Result<Box<dyn DeviceStream>, ElmError> {
    let addr = config.address();
    debug!(
        addr = %addr,
        tls = config.use_tls,
        timeout_ms = config.timeout.as_millis(),
        "Connecting to adapter"
    );

    let stream = tokio::time::timeout(config.timeout, dial(config, &addr))
        .await
        .map_err(|_| {
            error!(addr = %addr, "Connection timed out");
            ElmError::ConnectTimeout {
                addr: addr.clone(),
                timeout: config.timeout,
            }
        })??;

    info!(addr = %addr, tls = config.use_tls, "Connected to adapter");
    Ok(stream)
}

async fn dial(config: &ElmConfig, addr: &str) -> Result<Box<dyn DeviceStream>, ElmError> {
    let tcp = TcpStream::connect(addr).await.map_err(|e| {
        error!(addr = %addr, error = %e, "TCP connection failed");
        ElmError::Connect {
            addr: addr.to_string(),
            source: e,
        }
    })?;

    // Commands are a few bytes each
    if let Err(e) = tcp.set_nodelay(true) {
        warn!(addr = %addr, error = %e, "Failed to set TCP_NODELAY (continuing anyway)");
    }

    if !config.use_tls {
        return Ok(Box::new(tcp));
    }

    let connector = TlsConnector::from(Arc::new(build_tls_config(&config.tls)?));
    let server_name = ServerName::try_from(config.tls_server_name().to_string())
        .map_err(|e| ElmError::Tls(format!("invalid server name: {e}")))?;

    let tls = connector.connect(server_name, tcp).await.map_err(|e| {
        error!(addr = %addr, error = %e, "TLS handshake failed");
        ElmError::Tls(e.to_string())
    })?;

    debug!(addr = %addr, "TLS handshake complete");
    Ok(Box::new(tls))
}

static TLS13_ONLY: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Build the rustls client configuration for a TLS policy
pub fn build_tls_config(options: &TlsOptions) -> Result<ClientConfig, ElmError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let versions = match options.min_version {
        TlsVersion::Tls12 => rustls::ALL_VERSIONS,
        TlsVersion::Tls13 => TLS13_ONLY,
    };

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(versions)?;

    let config = if options.verify_certificates {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        warn!("TLS certificate verification disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
            .with_no_client_auth()
    };

    Ok(config)
}

/// Accepts any server certificate but still checks handshake signatures
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
