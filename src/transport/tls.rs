//! # TLS Transport Layer
//!
//! Opens the encrypted stream to a match server and decides whether the
//! server is the one we were told to talk to.
//!
//! ## Trust model
//! Server identity is established by **public key pinning**: the subject
//! public key of the presented end-entity certificate must be byte-for-byte
//! equal to the key in [`ConnectionConfig::expected_server_public_key`].
//!
//! Under [`TrustPolicy::PinOnly`] (the default) the pin replaces chain
//! validation entirely, so self-signed or otherwise untrusted certificates are
//! accepted as long as the key matches, and a valid chain with the wrong key
//! is rejected. [`TrustPolicy::PinAndChain`] additionally requires the chain to
//! validate against the platform root store before the pin is checked.
//!
//! ## Responsibilities
//! - Open the TCP socket with Nagle's algorithm disabled
//! - Run the TLS handshake with the pinned-key verifier
//! - Map handshake failures onto [`ProtocolError`] so the reconnect state
//!   machine can classify them

use std::sync::Arc;
use std::time::SystemTime;

use futures::future::BoxFuture;
use futures::FutureExt;
use rustls::client::{ServerCertVerified, ServerCertVerifier, WebPkiVerifier};
use rustls::{Certificate, ClientConfig, RootCertStore, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, error, instrument, warn};

use crate::config::{ConnectionConfig, TlsSettings, TrustPolicy};
use crate::error::{constants, ProtocolError, Result};
use crate::transport::{BoxedStream, Connector};

/// Extract the raw subject public key (the BIT STRING contents of
/// `subjectPublicKeyInfo`) from a DER certificate.
pub fn subject_public_key(cert: &Certificate) -> Result<Vec<u8>> {
    let (_, parsed) = x509_parser::parse_x509_certificate(&cert.0)
        .map_err(|e| ProtocolError::TlsError(format!("{}: {e}", constants::ERR_CERT_PARSE)))?;
    Ok(parsed.public_key().subject_public_key.data.to_vec())
}

/// Certificate verifier that accepts exactly one server public key.
pub struct PinnedKeyVerifier {
    expected: Vec<u8>,
    chain: Option<WebPkiVerifier>,
}

impl PinnedKeyVerifier {
    /// Pin-only verifier: chain trust is not consulted.
    pub fn new(expected: Vec<u8>) -> Self {
        Self {
            expected,
            chain: None,
        }
    }

    /// Verifier that requires a valid chain to `roots` and the pinned key.
    pub fn with_chain(expected: Vec<u8>, roots: RootCertStore) -> Self {
        Self {
            expected,
            chain: Some(WebPkiVerifier::new(roots, None)),
        }
    }

    /// Whether `cert` carries the pinned key.
    pub fn matches(&self, cert: &Certificate) -> bool {
        match subject_public_key(cert) {
            Ok(presented) => presented == self.expected,
            Err(e) => {
                warn!(error = %e, "Could not read the server public key");
                false
            }
        }
    }
}

impl ServerCertVerifier for PinnedKeyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        scts: &mut dyn Iterator<Item = &[u8]>,
        ocsp_response: &[u8],
        now: SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if let Some(chain) = &self.chain {
            chain.verify_server_cert(
                end_entity,
                intermediates,
                server_name,
                scts,
                ocsp_response,
                now,
            )?;
        }

        if self.matches(end_entity) {
            debug!("Server public key matches the pinned key");
            Ok(ServerCertVerified::assertion())
        } else {
            error!("{}", constants::ERR_PIN_MISMATCH);
            Err(rustls::Error::General(constants::ERR_PIN_MISMATCH.into()))
        }
    }
}

/// TLS Client Configuration
pub struct TlsClientConfig {
    server_name: String,
    pinned_public_key: Vec<u8>,
    trust_policy: TrustPolicy,
}

impl TlsClientConfig {
    /// Create a pin-only TLS client configuration
    pub fn new<S: Into<String>>(server_name: S, pinned_public_key: Vec<u8>) -> Self {
        Self {
            server_name: server_name.into(),
            pinned_public_key,
            trust_policy: TrustPolicy::PinOnly,
        }
    }

    /// Select how the server certificate is trusted
    pub fn with_trust_policy(mut self, trust_policy: TrustPolicy) -> Self {
        self.trust_policy = trust_policy;
        self
    }

    /// Build the rustls client configuration
    pub fn load_client_config(&self) -> Result<ClientConfig> {
        if self.pinned_public_key.is_empty() {
            return Err(ProtocolError::ConfigError(
                "Pinned server public key cannot be empty".into(),
            ));
        }

        let verifier = match self.trust_policy {
            TrustPolicy::PinOnly => PinnedKeyVerifier::new(self.pinned_public_key.clone()),
            TrustPolicy::PinAndChain => {
                let mut root_store = RootCertStore::empty();
                let native_certs = rustls_native_certs::load_native_certs().map_err(|e| {
                    ProtocolError::TlsError(format!("Failed to load native certs: {e}"))
                })?;

                for cert in native_certs {
                    if let Err(e) = root_store.add(&Certificate(cert.0)) {
                        debug!(error = %e, "Skipping unusable native root certificate");
                    }
                }

                PinnedKeyVerifier::with_chain(self.pinned_public_key.clone(), root_store)
            }
        };

        Ok(ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth())
    }

    /// Get the server name as a rustls::ServerName
    pub fn server_name(&self) -> Result<ServerName> {
        ServerName::try_from(self.server_name.as_str())
            .map_err(|_| ProtocolError::TlsError(constants::ERR_INVALID_SERVER_NAME.into()))
    }
}

/// Production [`Connector`]: TCP + TLS with a pinned server key.
#[derive(Debug, Clone, Default)]
pub struct TlsTransport {
    settings: TlsSettings,
}

impl TlsTransport {
    pub fn new(settings: TlsSettings) -> Self {
        Self { settings }
    }

    fn client_config_for(&self, target: &ConnectionConfig) -> TlsClientConfig {
        let server_name = if self.settings.server_name.is_empty() {
            target.host.clone()
        } else {
            self.settings.server_name.clone()
        };
        TlsClientConfig::new(server_name, target.expected_server_public_key.clone())
            .with_trust_policy(self.settings.trust_policy)
    }
}

impl Connector for TlsTransport {
    fn connect<'a>(&'a self, target: &'a ConnectionConfig) -> BoxFuture<'a, Result<BoxedStream>> {
        async move { self.open(target).await }.boxed()
    }
}

impl TlsTransport {
    #[instrument(skip(self, target), fields(host = %target.host, port = target.port))]
    async fn open(&self, target: &ConnectionConfig) -> Result<BoxedStream> {
        let tls = self.client_config_for(target);
        let connector = TlsConnector::from(Arc::new(tls.load_client_config()?));
        let domain = tls.server_name()?;

        debug!("Opening TCP socket");
        let tcp = TcpStream::connect((target.host.as_str(), target.port)).await?;
        tcp.set_nodelay(true)?;

        debug!("Opening TLS stream");
        let stream = connector
            .connect(domain, tcp)
            .await
            .map_err(handshake_error)?;

        Ok(Box::new(stream))
    }
}

/// Map a failed TLS handshake onto the error taxonomy.
fn handshake_error(e: std::io::Error) -> ProtocolError {
    let pin_rejected = e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|tls| {
            matches!(tls, rustls::Error::General(msg) if msg == constants::ERR_PIN_MISMATCH)
        });

    if pin_rejected {
        ProtocolError::PinMismatch
    } else if e.kind() == std::io::ErrorKind::InvalidData {
        ProtocolError::TlsError(format!("TLS connection failed: {e}"))
    } else {
        ProtocolError::Io(e)
    }
}
