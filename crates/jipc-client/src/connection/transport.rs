//! Opens the byte stream a [`super::Connection`] runs over: plain TCP, or TLS
//! on top of TCP.
//!
//! TLS is used for transport encryption only. The server certificate is not
//! validated, matching engines that are typically deployed with self-signed
//! certificates.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{
    ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{self, ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::ClientError;

/// Any bidirectional byte stream a connection can run over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Dials `host:port` and, if enabled, completes the TLS handshake.
///
/// # Errors
///
/// [`ClientError::ConnectTimeout`] if the dial exceeds the configured limit,
/// [`ClientError::Transport`] for socket errors and [`ClientError::Tls`] for
/// TLS setup or negotiation failures.
pub async fn open(config: &ConnectionConfig) -> Result<BoxedStream, ClientError> {
    let dial = TcpStream::connect((config.host.as_str(), config.port));
    let tcp = match config.connect_timeout() {
        Some(limit) => timeout(limit, dial)
            .await
            .map_err(|_| ClientError::ConnectTimeout(config.connect_timeout_ms))??,
        None => dial.await?,
    };
    tcp.set_nodelay(config.no_delay)?;
    debug!(host = %config.host, port = config.port, tls = config.tls.enabled, "transport connected");

    if !config.tls.enabled {
        return Ok(Box::new(tcp));
    }

    let server_name = ServerName::try_from(config.server_name().to_owned())
        .map_err(|e| ClientError::Tls(format!("invalid server name: {e}")))?;
    let connector = TlsConnector::from(Arc::new(unverified_client_config()?));
    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| ClientError::Tls(format!("handshake failed: {e}")))?;
    Ok(Box::new(stream))
}

/// rustls client config that accepts any server certificate.
pub fn unverified_client_config() -> Result<ClientConfig, ClientError> {
    let provider = Arc::new(ring::default_provider());
    let verifier = Arc::new(AcceptAnyServerCert {
        provider: Arc::clone(&provider),
    });
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    Ok(config)
}

/// Skips certificate chain and name checks but still verifies handshake
/// signatures, so the session keys are bound to the presented certificate.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

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
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_unverified_client_config_builds() {
        let config = unverified_client_config().expect("config");
        assert!(config.alpn_protocols.is_empty());
    }

    #[tokio::test]
    async fn test_open_plain_tcp() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = ConnectionConfig::new("127.0.0.1", port);

        // Act
        let (opened, accepted) = tokio::join!(open(&config), listener.accept());

        // Assert
        assert!(opened.is_ok());
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn test_open_refused_is_transport_error() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = ConnectionConfig::new("127.0.0.1", port);

        let result = open(&config).await;

        assert!(matches!(result, Err(ClientError::Transport(_))));
    }

    #[tokio::test]
    async fn test_open_tls_rejects_invalid_server_name() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut config = ConnectionConfig::new("127.0.0.1", port);
        config.tls.enabled = true;
        config.tls.server_name = Some("not a valid name!".into());

        let (opened, _accepted) = tokio::join!(open(&config), listener.accept());

        assert!(matches!(opened, Err(ClientError::Tls(_))));
    }
}
