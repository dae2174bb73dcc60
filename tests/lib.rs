//! Shared fixtures for the PeerLink integration tests.
//!
//! Two kinds of remote are used: a real [`HandlerChain`] on the other end
//! of an in-memory pipe, and a [`ScriptedRemote`] that speaks the wire
//! protocol step by step so tests can send what a well-behaved node never
//! would.

use peerlink_core::message::{ControlMessage, SecureRequest, SecureResponse, SignatureRequest};
use peerlink_core::{
    Authenticator, ChannelNegotiator, HandlerChain, Identity, PROTO_CONTROL, Packet, Peer,
    SecureSuite, SuitePolicy,
};
use peerlink_crypto::{AeadSuite, SecureKey};
use peerlink_transport::{Connection, FrameTransport, TransportError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::duplex;

/// Frame limit used by every fixture.
pub const MAX_FRAME: usize = 64 * 1024;

/// Full negotiator + authenticator chain.
pub fn full_chain(identity: &Arc<Identity>, address: &str, policy: SuitePolicy) -> HandlerChain {
    HandlerChain::new()
        .with(Arc::new(ChannelNegotiator::new(address)))
        .with(Arc::new(Authenticator::new(
            Arc::clone(identity),
            Arc::new(policy),
        )))
}

/// Authenticator-only chain.
pub fn auth_chain(identity: &Arc<Identity>, policy: SuitePolicy) -> HandlerChain {
    HandlerChain::new().with(Arc::new(Authenticator::new(
        Arc::clone(identity),
        Arc::new(policy),
    )))
}

/// Policy with one suite of each kind.
pub fn policy(secure: SecureSuite, aead: AeadSuite) -> SuitePolicy {
    SuitePolicy::new(vec![secure], vec![aead])
}

/// The number a suite travels as on the wire.
pub fn wire_id<T: Serialize>(suite: &T) -> u32 {
    bincode::deserialize(&bincode::serialize(suite).expect("encode")).expect("u32 id")
}

/// [`SecureRequest`] with suites as bare wire ids, so a remote can offer ids
/// this build does not define.
#[derive(Debug, Serialize)]
pub struct RawSecureRequest {
    /// Requested channel
    pub channel: String,
    /// Secure suite ids, most preferred first
    pub secure_suites: Vec<u32>,
    /// AEAD suite ids, most preferred first
    pub aead_suites: Vec<u32>,
    /// Key exchange public value
    pub param: Vec<u8>,
}

/// A dialing and an accepting peer joined by an in-memory pipe.
pub fn peer_pair(dialer: &Identity, acceptor: &Identity, channel: &str) -> (Peer, Peer) {
    let (a, b) = duplex(MAX_FRAME);
    (
        Peer::new(Connection::plain(a, MAX_FRAME), dialer.peer_id(), true, "acceptor-socket")
            .with_channel(channel),
        Peer::new(Connection::plain(b, MAX_FRAME), acceptor.peer_id(), false, "dialer-socket"),
    )
}

/// A peer whose remote end is driven by hand.
pub fn scripted(outbound: bool, local: &Identity) -> (Peer, ScriptedRemote) {
    let (a, b) = duplex(MAX_FRAME);
    let peer = Peer::new(Connection::plain(a, MAX_FRAME), local.peer_id(), outbound, "scripted");
    (peer, ScriptedRemote::new(Connection::plain(b, MAX_FRAME)))
}

/// Hand-driven remote end of a connection.
pub struct ScriptedRemote {
    /// Connection to the peer under test
    pub conn: Connection,
    /// Identity used for `src` and signatures
    pub identity: Identity,
    /// Key exchange state once a secure message has been handled
    pub key: Option<SecureKey>,
}

impl ScriptedRemote {
    /// Remote with a fresh identity.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            identity: Identity::generate(),
            key: None,
        }
    }

    /// Send `message` with the remote's own id as `src`.
    pub async fn send<M: ControlMessage>(&mut self, message: &M) {
        let packet = Packet::control(self.identity.peer_id(), message).expect("encode");
        self.send_packet(&packet).await;
    }

    /// Send a prepared packet.
    pub async fn send_packet(&mut self, packet: &Packet) {
        let bytes = packet.to_bytes().expect("encode");
        self.conn.send_frame(&bytes).await.expect("send");
    }

    /// Receive the next packet and decode it as `M`.
    pub async fn recv<M: ControlMessage>(&mut self) -> M {
        let frame = self.conn.recv_frame().await.expect("recv");
        let packet = Packet::from_bytes(&frame).expect("packet");
        assert!(packet.is::<M>(), "unexpected {packet:?}");
        packet.decode().expect("payload")
    }

    /// Receive, expecting the peer to have hung up.
    pub async fn expect_closed(&mut self) {
        match self.conn.recv_frame().await {
            Err(e) if e.is_closed() => {}
            Err(TransportError::Crypto(_)) => {}
            other => panic!("expected close, got {other:?}"),
        }
    }

    /// Answer a secure request as the acceptor, choosing `suite`/`aead`,
    /// and upgrade the ECDHE record layer.
    pub async fn accept_ecdhe(&mut self, aead: AeadSuite) -> SecureRequest {
        let request: SecureRequest = self.recv().await;
        let mut key = SecureKey::new();
        key.setup(aead, &request.param, false).expect("setup");
        self.send(&SecureResponse {
            channel: request.channel.clone(),
            secure_suite: SecureSuite::Ecdhe,
            aead_suite: aead,
            param: key.public_param(),
            ..Default::default()
        })
        .await;
        self.upgrade(key);
        request
    }

    /// Open a key exchange as the dialer offering ECDHE with `aead`, and
    /// upgrade once the answer arrives.
    pub async fn dial_ecdhe(&mut self, channel: &str, aead: AeadSuite) -> SecureResponse {
        self.dial_raw(channel, &[wire_id(&SecureSuite::Ecdhe)], &[wire_id(&aead)])
            .await
    }

    /// Open a key exchange offering the given wire ids, and upgrade to the
    /// ECDHE record layer once the answer arrives.
    pub async fn dial_raw(
        &mut self,
        channel: &str,
        secure_ids: &[u32],
        aead_ids: &[u32],
    ) -> SecureResponse {
        let mut key = SecureKey::new();
        let request = RawSecureRequest {
            channel: channel.into(),
            secure_suites: secure_ids.to_vec(),
            aead_suites: aead_ids.to_vec(),
            param: key.public_param(),
        };
        let packet = Packet {
            protocol: PROTO_CONTROL,
            sub_protocol: SecureRequest::KIND.id(),
            src: self.identity.peer_id(),
            payload: bincode::serialize(&request).expect("encode"),
        };
        self.send_packet(&packet).await;

        let response: SecureResponse = self.recv().await;
        assert_eq!(response.secure_suite, SecureSuite::Ecdhe, "{response:?}");
        key.setup(response.aead_suite, &response.param, true)
            .expect("setup");
        self.upgrade(key);
        response
    }

    fn upgrade(&mut self, key: SecureKey) {
        let cipher = key.record_cipher().expect("cipher");
        let conn = std::mem::replace(&mut self.conn, placeholder());
        self.conn = conn.upgrade_secure(cipher).expect("upgrade");
        self.key = Some(key);
    }

    /// Valid signature request over the established challenge.
    pub fn signature_request(&self) -> SignatureRequest {
        let extra = self.key.as_ref().expect("key").extra().expect("extra");
        SignatureRequest {
            public_key: self.identity.public_key().to_vec(),
            signature: self.identity.sign(extra),
            rtt: Duration::ZERO,
        }
    }
}

fn placeholder() -> Connection {
    let (a, _) = duplex(1);
    Connection::plain(a, 1)
}
