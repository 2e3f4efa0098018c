// Channel transport configuration: endpoint URL, token, and TLS.
//
// Builds the rustls connector handed to tokio-tungstenite so verified and
// self-signed hubs share one dial path.

use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use secrecy::SecretString;
use tokio_tungstenite::Connector;
use url::Url;

use crate::error::Error;

/// Delay between `get_config` polls while the hub is still starting.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

const WEBSOCKET_PATH: &str = "/api/websocket";

/// TLS mode for the hub socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Plain `ws://`.
    Disabled,
    /// `wss://` verified against the webpki root store.
    System,
    /// `wss://` accepting any certificate (self-signed hubs).
    DangerAcceptInvalid,
}

impl TlsMode {
    pub fn from_flags(use_tls: bool, verify_certificate: bool) -> Self {
        match (use_tls, verify_certificate) {
            (false, _) => Self::Disabled,
            (true, true) => Self::System,
            (true, false) => Self::DangerAcceptInvalid,
        }
    }

    fn scheme(self) -> &'static str {
        match self {
            Self::Disabled => "ws",
            Self::System | Self::DangerAcceptInvalid => "wss",
        }
    }
}

/// Everything one [`Channel`](crate::Channel) needs to dial and authenticate.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: Url,
    pub token: SecretString,
    pub tls: TlsMode,
    pub retry_interval: Duration,
}

impl ChannelConfig {
    /// Build the endpoint URL `{ws|wss}://{host}:{port}/api/websocket`.
    pub fn new(host: &str, port: u16, tls: TlsMode, token: SecretString) -> Result<Self, Error> {
        let host = host.trim();
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_owned()
        };
        let url = Url::parse(&format!("{}://{host}:{port}{WEBSOCKET_PATH}", tls.scheme()))?;

        Ok(Self {
            url,
            token,
            tls,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        })
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// The rustls connector for this mode; `None` for plain sockets.
    pub(crate) fn connector(&self) -> Result<Option<Connector>, Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = match self.tls {
            TlsMode::Disabled => return Ok(None),
            TlsMode::System | TlsMode::DangerAcceptInvalid => {
                ClientConfig::builder_with_provider(Arc::clone(&provider))
                    .with_safe_default_protocol_versions()
                    .map_err(|e| Error::Tls(e.to_string()))?
            }
        };

        let config = if self.tls == TlsMode::System {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        } else {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
                .with_no_client_auth()
        };

        Ok(Some(Connector::Rustls(Arc::new(config))))
    }
}

/// Skips chain validation but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
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
