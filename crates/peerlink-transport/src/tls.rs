//! TLS 1.3 transport keyed from the handshake.
//!
//! Both sides derive the same Ed25519 key from the key exchange's TLS seed.
//! The side that received the secure request runs the TLS server with a
//! self-signed certificate for that key; the requester runs the client and
//! accepts only a certificate carrying that exact key, verifying the
//! handshake signature against it. Only the cipher suite matching the
//! negotiated AEAD suite is enabled.
//!
//! A [`KeyLog`] attached to the credentials receives rustls' traffic
//! secrets, keyed by the TLS client random.

use crate::frame::{read_frame, write_frame};
use crate::transport::{
    BoxedStream, FrameTransport, TransportError, TransportKind, TransportResult, TransportStats,
};
use async_trait::async_trait;
use peerlink_crypto::{AeadSuite, KeyLog};
use peerlink_crypto::constant_time::ct_contains;
use peerlink_crypto::signatures::{Signature, SigningKey, VerifyingKey};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};
use tracing::debug;
use zeroize::Zeroizing;

/// Name placed in the certificate and sent as SNI.
pub const SERVER_NAME: &str = "peerlink";

/// PKCS#8 v1 header for a bare Ed25519 private key (RFC 8410).
const ED25519_PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

fn tls_err(e: impl std::fmt::Display) -> TransportError {
    TransportError::Tls(e.to_string())
}

/// Which end of the TLS handshake this side plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsRole {
    /// Received the secure request
    Server,
    /// Sent the secure request
    Client,
}

/// Certificate and key derived from a handshake's TLS seed.
pub struct TlsCredentials {
    certificate: CertificateDer<'static>,
    pkcs8: Zeroizing<Vec<u8>>,
    public_key: [u8; 32],
    key_log: Option<Arc<dyn KeyLog>>,
}

impl TlsCredentials {
    /// Derive credentials from the 32-byte seed shared by both peers.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Tls`] if certificate generation fails.
    pub fn from_seed(seed: &[u8; 32]) -> TransportResult<Self> {
        let public_key = SigningKey::from_bytes(seed).verifying_key().to_bytes();

        let mut pkcs8 = Zeroizing::new(Vec::with_capacity(ED25519_PKCS8_PREFIX.len() + 32));
        pkcs8.extend_from_slice(&ED25519_PKCS8_PREFIX);
        pkcs8.extend_from_slice(seed);

        let der = PrivatePkcs8KeyDer::from(pkcs8.as_slice());
        let key_pair =
            rcgen::KeyPair::from_pkcs8_der_and_sign_algo(&der, &rcgen::PKCS_ED25519).map_err(tls_err)?;
        let params = rcgen::CertificateParams::new(vec![SERVER_NAME.to_string()]).map_err(tls_err)?;
        let certificate = params.self_signed(&key_pair).map_err(tls_err)?;

        Ok(Self {
            certificate: certificate.der().clone(),
            pkcs8,
            public_key,
            key_log: None,
        })
    }

    /// Log the TLS secrets of connections using these credentials.
    #[must_use]
    pub fn with_key_log(mut self, key_log: Arc<dyn KeyLog>) -> Self {
        self.key_log = Some(key_log);
        self
    }

    /// Ed25519 public key the certificate must carry.
    #[must_use]
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// The self-signed certificate.
    #[must_use]
    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.certificate
    }

    fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.pkcs8.to_vec()))
    }

    fn rustls_key_log(&self) -> Option<Arc<dyn rustls::KeyLog>> {
        self.key_log
            .as_ref()
            .map(|log| Arc::new(ForwardKeyLog(Arc::clone(log))) as Arc<dyn rustls::KeyLog>)
    }
}

#[derive(Debug)]
struct ForwardKeyLog(Arc<dyn KeyLog>);

impl rustls::KeyLog for ForwardKeyLog {
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]) {
        self.0.log(label, client_random, secret);
    }
}

/// Crypto provider limited to the TLS 1.3 suite matching `aead`.
///
/// # Errors
///
/// Returns [`TransportError::Tls`] for [`AeadSuite::Unknown`].
pub fn provider_for(aead: AeadSuite) -> TransportResult<Arc<CryptoProvider>> {
    let suite = match aead {
        AeadSuite::ChaCha20Poly1305 => ring::cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
        AeadSuite::Aes128Gcm => ring::cipher_suite::TLS13_AES_128_GCM_SHA256,
        AeadSuite::Aes256Gcm => ring::cipher_suite::TLS13_AES_256_GCM_SHA384,
        AeadSuite::Unknown => return Err(tls_err("an aead suite is required for tls")),
    };
    Ok(Arc::new(CryptoProvider {
        cipher_suites: vec![suite],
        ..ring::default_provider()
    }))
}

fn server_config(creds: &TlsCredentials, aead: AeadSuite) -> TransportResult<ServerConfig> {
    let mut config = ServerConfig::builder_with_provider(provider_for(aead)?)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(tls_err)?
        .with_no_client_auth()
        .with_single_cert(vec![creds.certificate.clone()], creds.private_key())
        .map_err(tls_err)?;
    config.send_tls13_tickets = 0;
    if let Some(key_log) = creds.rustls_key_log() {
        config.key_log = key_log;
    }
    Ok(config)
}

fn client_config(creds: &TlsCredentials, aead: AeadSuite) -> TransportResult<ClientConfig> {
    let mut config = ClientConfig::builder_with_provider(provider_for(aead)?)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(tls_err)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PinnedKeyVerifier::new(creds.public_key)))
        .with_no_client_auth();
    if let Some(key_log) = creds.rustls_key_log() {
        config.key_log = key_log;
    }
    Ok(config)
}

/// Run the TLS handshake over `stream` in the given role.
///
/// # Errors
///
/// Returns [`TransportError::Tls`] for configuration problems and
/// [`TransportError::Io`] if the handshake itself fails.
pub async fn handshake(
    stream: BoxedStream,
    role: TlsRole,
    creds: &TlsCredentials,
    aead: AeadSuite,
    max_frame_size: usize,
) -> TransportResult<TlsConn> {
    let stream: TlsStream<BoxedStream> = match role {
        TlsRole::Server => {
            let acceptor = TlsAcceptor::from(Arc::new(server_config(creds, aead)?));
            acceptor.accept(stream).await?.into()
        }
        TlsRole::Client => {
            let connector = TlsConnector::from(Arc::new(client_config(creds, aead)?));
            let name = ServerName::try_from(SERVER_NAME).map_err(tls_err)?;
            connector.connect(name, stream).await?.into()
        }
    };
    debug!(?role, %aead, "tls handshake complete");

    Ok(TlsConn {
        stream,
        role,
        aead,
        max_frame_size,
        stats: TransportStats::default(),
    })
}

/// Connection running over TLS 1.3.
pub struct TlsConn {
    stream: TlsStream<BoxedStream>,
    role: TlsRole,
    aead: AeadSuite,
    max_frame_size: usize,
    stats: TransportStats,
}

impl TlsConn {
    /// Which end of the TLS handshake this side played.
    #[must_use]
    pub fn role(&self) -> TlsRole {
        self.role
    }

    /// The negotiated AEAD suite.
    #[must_use]
    pub fn suite(&self) -> AeadSuite {
        self.aead
    }
}

#[async_trait]
impl FrameTransport for TlsConn {
    async fn send_frame(&mut self, frame: &[u8]) -> TransportResult<()> {
        write_frame(&mut self.stream, frame, self.max_frame_size).await?;
        self.stats.record_send(frame.len());
        Ok(())
    }

    async fn recv_frame(&mut self) -> TransportResult<Vec<u8>> {
        let frame = read_frame(&mut self.stream, self.max_frame_size).await?;
        self.stats.record_recv(frame.len());
        Ok(frame)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tls
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

/// Accepts exactly one Ed25519 server key.
#[derive(Debug)]
struct PinnedKeyVerifier {
    expected: [u8; 32],
}

impl PinnedKeyVerifier {
    fn new(expected: [u8; 32]) -> Self {
        Self { expected }
    }
}

impl ServerCertVerifier for PinnedKeyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if ct_contains(end_entity.as_ref(), &self.expected) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General(
                "certificate does not carry the negotiated key".into(),
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Err(rustls::Error::General("tls 1.2 is not supported".into()))
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        _cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        if dss.scheme != SignatureScheme::ED25519 {
            return Err(rustls::Error::General(format!(
                "unexpected signature scheme {:?}",
                dss.scheme
            )));
        }
        let key = VerifyingKey::from_bytes(&self.expected).map_err(tls_err_general)?;
        let signature = Signature::from_slice(dss.signature()).map_err(tls_err_general)?;
        key.verify(message, &signature).map_err(tls_err_general)?;
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![SignatureScheme::ED25519]
    }
}

fn tls_err_general(e: impl std::fmt::Display) -> rustls::Error {
    rustls::Error::General(e.to_string())
}
