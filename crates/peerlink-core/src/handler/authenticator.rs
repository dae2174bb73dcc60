//! Key exchange and identity binding stage.
//!
//! Two rounds, each started by the dialing side:
//!
//! ```text
//!   dialer                                   acceptor
//!     │── SecureRequest {suites, param} ────────►│  pick from own list
//!     │◄─────── SecureResponse {choice, param} ──│  derive keys, upgrade
//!     │  derive keys, upgrade                    │
//!     │══ SignatureRequest {pk, sig, rtt} ══════►│  verify, bind id
//!     │◄══════ SignatureResponse {pk, sig, rtt} ═│
//!     │  verify, bind id                         │
//! ```
//!
//! The signatures cover the `extra` secret from the key exchange, so they
//! bind each identity to this connection's keys. The acceptor's preference
//! order decides the suite; the dialer only checks the choice is one it
//! offered.

use super::{Flow, PeerHandler};
use crate::config::HandshakeConfig;
use crate::error::{HandshakeError, Result};
use crate::identity::{Identity, PeerId, verify_signature};
use crate::message::{
    ControlMessage, SecureError, SecureRequest, SecureResponse, SecureSuite, SignatureRequest,
    SignatureResponse,
};
use crate::packet::Packet;
use crate::peer::Peer;
use crate::suite::{SuitePolicy, select};
use async_trait::async_trait;
use peerlink_crypto::{AeadSuite, KeyLog, KeyLogFile, SecureKey};
use peerlink_transport::tls::{TlsCredentials, TlsRole};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

/// Default tolerated difference between declared and measured RTT.
pub const DEFAULT_RTT_ACCURACY: Duration = Duration::from_millis(10);

/// Negotiates transport security and verifies the remote identity.
#[derive(Debug, Clone)]
pub struct Authenticator {
    identity: Arc<Identity>,
    policy: Arc<SuitePolicy>,
    rtt_accuracy: Duration,
    key_log: Option<Arc<dyn KeyLog>>,
}

impl Authenticator {
    /// Authenticator signing with `identity` and choosing suites from `policy`.
    #[must_use]
    pub fn new(identity: Arc<Identity>, policy: Arc<SuitePolicy>) -> Self {
        Self {
            identity,
            policy,
            rtt_accuracy: DEFAULT_RTT_ACCURACY,
            key_log: None,
        }
    }

    /// Authenticator configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidConfig`] if the configured key log
    /// file cannot be opened.
    pub fn from_config(identity: Arc<Identity>, config: &HandshakeConfig) -> Result<Self> {
        let authenticator = Self::new(identity, Arc::new(config.suite_policy()))
            .with_rtt_accuracy(config.rtt_accuracy());
        let Some(path) = &config.key_log_file else {
            return Ok(authenticator);
        };
        let file = KeyLogFile::open(path).map_err(|e| {
            HandshakeError::InvalidConfig(Cow::Owned(format!(
                "key log file {}: {e}",
                path.display()
            )))
        })?;
        tracing::warn!("Writing handshake secrets to {}", path.display());
        Ok(authenticator.with_key_log(Arc::new(file)))
    }

    /// Write every handshake's secrets to `key_log`.
    #[must_use]
    pub fn with_key_log(mut self, key_log: Arc<dyn KeyLog>) -> Self {
        self.key_log = Some(key_log);
        self
    }

    fn new_secure_key(&self) -> SecureKey {
        match &self.key_log {
            Some(key_log) => SecureKey::new().with_key_log(Arc::clone(key_log)),
            None => SecureKey::new(),
        }
    }

    /// RTT difference tolerated before warning.
    #[must_use]
    pub fn with_rtt_accuracy(mut self, accuracy: Duration) -> Self {
        self.rtt_accuracy = accuracy;
        self
    }

    async fn send_secure_request(&self, peer: &mut Peer) -> Result<()> {
        let key = self.new_secure_key();
        let request = SecureRequest {
            channel: peer.channel().to_owned(),
            secure_suites: self.policy.secure_suites(peer.channel()).to_vec(),
            aead_suites: self.policy.aead_suites(peer.channel()).to_vec(),
            param: key.public_param(),
        };
        peer.set_secure_key(key);
        peer.rtt_mut().start();
        peer.send(&request).await
    }

    async fn handle_secure_request(&self, packet: &Packet, peer: &mut Peer) -> Result<Flow> {
        let request: SecureRequest = packet.decode()?;
        tracing::debug!(
            "{} offers {:?} / {:?} on '{}'",
            peer,
            request.secure_suites,
            request.aead_suites,
            request.channel
        );

        let mut response = SecureResponse {
            channel: peer.channel().to_owned(),
            ..Default::default()
        };
        response.secure_suite = select(
            self.policy.secure_suites(&request.channel),
            &request.secure_suites,
        )
        .unwrap_or_default();
        response.aead_suite = select(
            self.policy.aead_suites(&request.channel),
            &request.aead_suites,
        )
        .unwrap_or_default();
        if !response.secure_suite.is_known()
            || (response.secure_suite.is_encrypted() && !response.aead_suite.is_known())
        {
            response.error = SecureError::Invalid;
        }

        let live = peer.kind()?;
        if live.is_secured() {
            // The live transport wins over whatever the remote proposes.
            response.secure_suite = live.into();
            response.error = SecureError::AlreadyEstablished;
        } else if peer.secure_key().is_some() {
            return Err(HandshakeError::out_of_order(
                "second secure request before the first completed",
            ));
        } else if response.error == SecureError::None {
            let key = self.new_secure_key();
            response.param = key.public_param();
            peer.set_secure_key(key);
        }

        peer.rtt_mut().start();
        peer.send(&response).await?;

        match response.error {
            SecureError::None => {}
            SecureError::AlreadyEstablished => return Err(HandshakeError::AlreadySecured(live)),
            SecureError::Invalid => {
                return Err(HandshakeError::Negotiation(Cow::Owned(format!(
                    "no common suite with {:?} / {:?}",
                    request.secure_suites, request.aead_suites
                ))));
            }
        }

        peer.set_channel(request.channel);
        self.establish(
            peer,
            response.secure_suite,
            response.aead_suite,
            &request.param,
            TlsRole::Server,
        )
        .await?;
        Ok(Flow::Stay)
    }

    async fn handle_secure_response(&self, packet: &Packet, peer: &mut Peer) -> Result<Flow> {
        let response: SecureResponse = packet.decode()?;
        peer.rtt_mut().stop();

        if response.error != SecureError::None {
            return Err(HandshakeError::SecureRejected(response.error));
        }
        let channel = peer.channel();
        if !response.secure_suite.is_known()
            || !self.policy.secure_suites(channel).contains(&response.secure_suite)
        {
            return Err(HandshakeError::Negotiation(Cow::Owned(format!(
                "remote chose secure suite {} which was not offered",
                response.secure_suite
            ))));
        }
        if response.secure_suite.is_encrypted()
            && (!response.aead_suite.is_known()
                || !self.policy.aead_suites(channel).contains(&response.aead_suite))
        {
            return Err(HandshakeError::Negotiation(Cow::Owned(format!(
                "remote chose AEAD suite {} which was not offered",
                response.aead_suite
            ))));
        }

        let live = peer.kind()?;
        if live.is_secured() {
            return Err(HandshakeError::AlreadySecured(live));
        }
        match peer.secure_key() {
            Some(key) if !key.is_established() => {}
            _ => {
                return Err(HandshakeError::out_of_order(
                    "secure response without a pending request",
                ));
            }
        }

        self.establish(
            peer,
            response.secure_suite,
            response.aead_suite,
            &response.param,
            TlsRole::Client,
        )
        .await?;

        let request = SignatureRequest {
            public_key: self.identity.public_key().to_vec(),
            signature: self.identity.sign(challenge(peer)?),
            rtt: peer.rtt().last(),
        };
        peer.send(&request).await?;
        Ok(Flow::Stay)
    }

    async fn handle_signature_request(&self, packet: &Packet, peer: &mut Peer) -> Result<Flow> {
        if peer.is_outbound() {
            return Err(HandshakeError::out_of_order("signature request sent to the dialer"));
        }
        let request: SignatureRequest = packet.decode()?;
        let measured = peer.rtt_mut().stop();
        self.check_rtt(peer, request.rtt, measured);

        let extra = *challenge(peer)?;
        let verified = verify_signature(&request.public_key, &request.signature, &extra);
        let response = match &verified {
            Ok(_) => SignatureResponse {
                public_key: self.identity.public_key().to_vec(),
                signature: self.identity.sign(&extra),
                rtt: peer.rtt().last(),
                error: String::new(),
            },
            Err(e) => SignatureResponse {
                error: e.to_string(),
                ..Default::default()
            },
        };
        peer.send(&response).await?;

        let id = verified.map_err(HandshakeError::Signature)?;
        self.bind(peer, id, packet.src);
        Ok(Flow::Advance)
    }

    async fn handle_signature_response(&self, packet: &Packet, peer: &mut Peer) -> Result<Flow> {
        if !peer.is_outbound() {
            return Err(HandshakeError::out_of_order(
                "signature response sent to the acceptor",
            ));
        }
        let response: SignatureResponse = packet.decode()?;
        self.check_rtt(peer, response.rtt, peer.rtt().last());

        if !response.error.is_empty() {
            return Err(HandshakeError::Rejected(response.error));
        }
        let id = verify_signature(&response.public_key, &response.signature, challenge(peer)?)
            .map_err(HandshakeError::Signature)?;
        self.bind(peer, id, packet.src);
        Ok(Flow::Advance)
    }

    /// Run key derivation and swap the transport for the chosen suite.
    async fn establish(
        &self,
        peer: &mut Peer,
        suite: SecureSuite,
        aead: AeadSuite,
        remote_param: &[u8],
        role: TlsRole,
    ) -> Result<()> {
        let outbound = peer.is_outbound();
        let key = peer
            .secure_key_mut()
            .ok_or(HandshakeError::out_of_order("key exchange without key state"))?;
        key.setup(aead, remote_param, outbound)?;

        match suite {
            SecureSuite::Ecdhe => {
                let cipher = established_key(peer)?.record_cipher()?;
                let conn = peer.take_conn()?;
                peer.set_conn(conn.upgrade_secure(cipher)?);
            }
            SecureSuite::Tls => {
                let mut creds = TlsCredentials::from_seed(established_key(peer)?.tls_seed()?)?;
                if let Some(key_log) = &self.key_log {
                    creds = creds.with_key_log(Arc::clone(key_log));
                }
                let conn = peer.take_conn()?;
                peer.set_conn(conn.upgrade_tls(role, &creds, aead).await?);
            }
            SecureSuite::None => {}
            SecureSuite::Unknown => return Err(HandshakeError::negotiation("no suite chosen")),
        }

        peer.set_suites(suite, aead);
        tracing::info!("{} secured with {} ({})", peer, suite, aead);
        Ok(())
    }

    fn bind(&self, peer: &mut Peer, id: PeerId, claimed: PeerId) {
        if id != claimed {
            tracing::warn!(
                "{} claims id {} but proved {}; keeping the proven id",
                peer,
                claimed.short(),
                id.short()
            );
        }
        peer.set_id(id);
        peer.clear_secure_key();
        tracing::info!("{} authenticated on '{}'", peer, peer.channel());
    }

    fn check_rtt(&self, peer: &Peer, declared: Duration, measured: Duration) {
        let skew = declared.abs_diff(measured);
        if skew > self.rtt_accuracy {
            tracing::warn!(
                "{} reports rtt {:?}, measured {:?} (off by {:?})",
                peer,
                declared,
                measured,
                skew
            );
        }
    }
}

fn established_key(peer: &Peer) -> Result<&SecureKey> {
    peer.secure_key()
        .filter(|key| key.is_established())
        .ok_or(HandshakeError::out_of_order("no established key exchange"))
}

/// Shared secret both sides sign.
fn challenge(peer: &Peer) -> Result<&[u8; 32]> {
    Ok(established_key(peer)?.extra()?)
}

#[async_trait]
impl PeerHandler for Authenticator {
    fn name(&self) -> &'static str {
        "authenticator"
    }

    async fn on_peer(&self, peer: &mut Peer) -> Result<Flow> {
        if peer.is_outbound() {
            self.send_secure_request(peer).await?;
        }
        Ok(Flow::Stay)
    }

    async fn on_packet(&self, packet: &Packet, peer: &mut Peer) -> Result<Flow> {
        match packet.control_kind() {
            Some(SecureRequest::KIND) => self.handle_secure_request(packet, peer).await,
            Some(SecureResponse::KIND) => self.handle_secure_response(packet, peer).await,
            Some(SignatureRequest::KIND) => self.handle_signature_request(packet, peer).await,
            Some(SignatureResponse::KIND) => self.handle_signature_response(packet, peer).await,
            _ => Ok(Flow::Forward),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HandlerChain;
    use crate::error::ErrorCategory;
    use peerlink_transport::{Connection, FrameTransport, TransportKind};
    use tokio::io::duplex;

    fn authenticator(identity: &Arc<Identity>, policy: SuitePolicy) -> HandlerChain {
        HandlerChain::new().with(Arc::new(Authenticator::new(
            Arc::clone(identity),
            Arc::new(policy),
        )))
    }

    fn peers(a_id: PeerId, b_id: PeerId) -> (Peer, Peer) {
        let (a, b) = duplex(64 * 1024);
        (
            Peer::new(Connection::plain(a, 64 * 1024), a_id, true, "acceptor"),
            Peer::new(Connection::plain(b, 64 * 1024), b_id, false, "dialer"),
        )
    }

    async fn handshake(
        dialer_policy: SuitePolicy,
        acceptor_policy: SuitePolicy,
    ) -> (Result<Peer>, Result<Peer>, Arc<Identity>, Arc<Identity>) {
        let dialer_identity = Arc::new(Identity::generate());
        let acceptor_identity = Arc::new(Identity::generate());
        let (dialer, acceptor) = peers(dialer_identity.peer_id(), acceptor_identity.peer_id());

        let dialer_chain = authenticator(&dialer_identity, dialer_policy);
        let acceptor_chain = authenticator(&acceptor_identity, acceptor_policy);
        let (d, a) = tokio::join!(dialer_chain.run(dialer), acceptor_chain.run(acceptor));
        (d, a, dialer_identity, acceptor_identity)
    }

    #[tokio::test]
    async fn test_ecdhe_handshake() {
        let policy = SuitePolicy::new(vec![SecureSuite::Ecdhe], vec![AeadSuite::Aes256Gcm]);
        let (d, a, d_id, a_id) = handshake(policy.clone(), policy).await;
        let mut d = d.unwrap();
        let mut a = a.unwrap();

        assert_eq!(d.id(), Some(a_id.peer_id()));
        assert_eq!(a.id(), Some(d_id.peer_id()));
        assert_eq!(d.kind().unwrap(), TransportKind::Secure);
        assert_eq!(a.kind().unwrap(), TransportKind::Secure);
        assert_eq!(d.suites(), (SecureSuite::Ecdhe, AeadSuite::Aes256Gcm));
        assert_eq!(a.suites(), d.suites());
        assert!(d.secure_key().is_none());
        assert!(a.secure_key().is_none());

        // The upgraded connections carry traffic.
        let payload = Packet::control(d.local_id(), &SignatureResponse::default()).unwrap();
        d.send_packet(&payload).await.unwrap();
        assert_eq!(a.recv_packet().await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_tls_handshake() {
        let policy = SuitePolicy::new(vec![SecureSuite::Tls], vec![AeadSuite::ChaCha20Poly1305]);
        let (d, a, _, _) = handshake(policy.clone(), policy).await;
        let d = d.unwrap();
        let a = a.unwrap();
        assert_eq!(d.kind().unwrap(), TransportKind::Tls);
        assert_eq!(a.kind().unwrap(), TransportKind::Tls);
        assert_eq!(d.suites(), (SecureSuite::Tls, AeadSuite::ChaCha20Poly1305));
    }

    #[tokio::test]
    async fn test_none_suite_binds_identity_without_encryption() {
        let policy = SuitePolicy::new(vec![SecureSuite::None], vec![]);
        let (d, a, _, a_id) = handshake(policy.clone(), policy).await;
        let d = d.unwrap();
        assert_eq!(d.id(), Some(a_id.peer_id()));
        assert_eq!(d.kind().unwrap(), TransportKind::Plain);
        assert_eq!(a.unwrap().suites().0, SecureSuite::None);
    }

    #[tokio::test]
    async fn test_acceptor_order_wins() {
        let dialer = SuitePolicy::new(
            vec![SecureSuite::Ecdhe, SecureSuite::Tls],
            vec![AeadSuite::ChaCha20Poly1305, AeadSuite::Aes128Gcm],
        );
        let acceptor = SuitePolicy::new(
            vec![SecureSuite::Tls, SecureSuite::Ecdhe],
            vec![AeadSuite::Aes128Gcm, AeadSuite::ChaCha20Poly1305],
        );
        let (d, a, _, _) = handshake(dialer, acceptor).await;
        assert_eq!(d.unwrap().suites(), (SecureSuite::Tls, AeadSuite::Aes128Gcm));
        assert_eq!(a.unwrap().suites(), (SecureSuite::Tls, AeadSuite::Aes128Gcm));
    }

    #[tokio::test]
    async fn test_disjoint_suites_fail_both_sides() {
        let (d, a, _, _) = handshake(
            SuitePolicy::new(vec![SecureSuite::Tls], vec![AeadSuite::Aes256Gcm]),
            SuitePolicy::new(vec![SecureSuite::Ecdhe], vec![AeadSuite::Aes256Gcm]),
        )
        .await;
        assert!(matches!(
            d.unwrap_err(),
            HandshakeError::SecureRejected(SecureError::Invalid)
        ));
        assert_eq!(a.unwrap_err().category(), ErrorCategory::Negotiation);
    }

    #[tokio::test]
    async fn test_encrypted_suite_needs_common_aead() {
        let (d, a, _, _) = handshake(
            SuitePolicy::new(vec![SecureSuite::Ecdhe], vec![AeadSuite::Aes128Gcm]),
            SuitePolicy::new(vec![SecureSuite::Ecdhe], vec![AeadSuite::Aes256Gcm]),
        )
        .await;
        assert!(matches!(
            d.unwrap_err(),
            HandshakeError::SecureRejected(SecureError::Invalid)
        ));
        assert!(a.is_err());
    }

    #[tokio::test]
    async fn test_signature_request_before_key_exchange() {
        let identity = Arc::new(Identity::generate());
        let (a, b) = duplex(16 * 1024);
        let mut remote = Connection::plain(a, 4096);
        let acceptor = Peer::new(Connection::plain(b, 4096), identity.peer_id(), false, "r");

        let request = SignatureRequest {
            public_key: identity.public_key().to_vec(),
            signature: identity.sign(b"whatever"),
            rtt: Duration::ZERO,
        };
        let packet = Packet::control(PeerId::default(), &request).unwrap();
        remote.send_frame(&packet.to_bytes().unwrap()).await.unwrap();

        let err = authenticator(&identity, SuitePolicy::default())
            .run(acceptor)
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Protocol);
        // Nothing was answered before the close.
        assert!(remote.recv_frame().await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_unsolicited_secure_response() {
        let identity = Arc::new(Identity::generate());
        let (a, b) = duplex(16 * 1024);
        let mut remote = Connection::plain(a, 4096);
        let acceptor = Peer::new(Connection::plain(b, 4096), identity.peer_id(), false, "r");

        let response = SecureResponse {
            secure_suite: SecureSuite::Ecdhe,
            aead_suite: AeadSuite::Aes256Gcm,
            param: vec![9; 32],
            ..Default::default()
        };
        let packet = Packet::control(PeerId::default(), &response).unwrap();
        remote.send_frame(&packet.to_bytes().unwrap()).await.unwrap();

        let err = authenticator(&identity, SuitePolicy::default())
            .run(acceptor)
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidState(_)));
    }
}
