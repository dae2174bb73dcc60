//! Per-connection handshake state.
//!
//! A [`Peer`] owns one connection for the length of its handshake. Handlers
//! receive it by `&mut`, so only the stage currently running can touch it.
//! Once the last stage finishes it becomes a [`ReadyPeer`].

use crate::error::{HandshakeError, Result};
use crate::identity::PeerId;
use crate::message::{ControlMessage, SecureSuite};
use crate::packet::Packet;
use peerlink_crypto::{AeadSuite, SecureKey};
use peerlink_transport::{Connection, FrameTransport, TransportKind};
use std::fmt;
use std::time::{Duration, Instant};

/// Round-trip timer.
///
/// Keeps the last sample and a running average.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rtt {
    started: Option<Instant>,
    last: Duration,
    total: Duration,
    samples: u32,
}

impl Rtt {
    /// Start timing.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Stop timing and record the sample. Without a prior
    /// [`start`](Self::start) nothing is recorded and zero is returned.
    pub fn stop(&mut self) -> Duration {
        let Some(started) = self.started.take() else {
            return Duration::ZERO;
        };
        self.record(started.elapsed());
        self.last
    }

    fn record(&mut self, sample: Duration) {
        self.last = sample;
        self.total = self.total.saturating_add(sample);
        self.samples = self.samples.saturating_add(1);
    }

    /// Last sample.
    #[must_use]
    pub fn last(&self) -> Duration {
        self.last
    }

    /// Average of all samples.
    #[must_use]
    pub fn average(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            self.total / self.samples
        }
    }

    /// Number of samples.
    #[must_use]
    pub fn samples(&self) -> u32 {
        self.samples
    }
}

/// One connection going through the handshake.
pub struct Peer {
    conn: Option<Connection>,
    local_id: PeerId,
    id: Option<PeerId>,
    channel: String,
    net_address: String,
    remote_addr: String,
    outbound: bool,
    secure_key: Option<SecureKey>,
    secure_suite: SecureSuite,
    aead_suite: AeadSuite,
    rtt: Rtt,
    pub(crate) stage: usize,
}

impl Peer {
    /// Wrap a connection. `local_id` is stamped on every packet sent;
    /// `remote_addr` labels the peer in logs until its identity is known.
    pub fn new(
        conn: Connection,
        local_id: PeerId,
        outbound: bool,
        remote_addr: impl Into<String>,
    ) -> Self {
        Self {
            conn: Some(conn),
            local_id,
            id: None,
            channel: String::new(),
            net_address: String::new(),
            remote_addr: remote_addr.into(),
            outbound,
            secure_key: None,
            secure_suite: SecureSuite::None,
            aead_suite: AeadSuite::Unknown,
            rtt: Rtt::default(),
            stage: 0,
        }
    }

    /// Set the channel an outbound peer asks to join.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Verified remote identity, once authenticated.
    #[must_use]
    pub fn id(&self) -> Option<PeerId> {
        self.id
    }

    /// Local node id.
    #[must_use]
    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    /// Negotiated channel.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Address the remote declared during channel negotiation.
    #[must_use]
    pub fn net_address(&self) -> &str {
        &self.net_address
    }

    /// Socket-level address label.
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Whether we dialed this peer.
    #[must_use]
    pub fn is_outbound(&self) -> bool {
        self.outbound
    }

    /// Round-trip timer.
    #[must_use]
    pub fn rtt(&self) -> &Rtt {
        &self.rtt
    }

    pub(crate) fn rtt_mut(&mut self) -> &mut Rtt {
        &mut self.rtt
    }

    /// Index of the chain stage handling this peer.
    #[must_use]
    pub fn stage(&self) -> usize {
        self.stage
    }

    /// Negotiated suites; `(None, Unknown)` until key exchange completes.
    #[must_use]
    pub fn suites(&self) -> (SecureSuite, AeadSuite) {
        (self.secure_suite, self.aead_suite)
    }

    /// Kind of the live transport.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Closed`] if the connection is gone.
    pub fn kind(&self) -> Result<TransportKind> {
        self.conn
            .as_ref()
            .map(FrameTransport::kind)
            .ok_or(HandshakeError::Closed("connection already closed".into()))
    }

    pub(crate) fn set_channel(&mut self, channel: String) {
        self.channel = channel;
    }

    pub(crate) fn set_net_address(&mut self, address: String) {
        self.net_address = address;
    }

    pub(crate) fn set_id(&mut self, id: PeerId) {
        self.id = Some(id);
    }

    pub(crate) fn set_suites(&mut self, secure: SecureSuite, aead: AeadSuite) {
        self.secure_suite = secure;
        self.aead_suite = aead;
    }

    pub(crate) fn secure_key(&self) -> Option<&SecureKey> {
        self.secure_key.as_ref()
    }

    pub(crate) fn secure_key_mut(&mut self) -> Option<&mut SecureKey> {
        self.secure_key.as_mut()
    }

    pub(crate) fn set_secure_key(&mut self, key: SecureKey) {
        self.secure_key = Some(key);
    }

    pub(crate) fn clear_secure_key(&mut self) {
        self.secure_key = None;
    }

    pub(crate) fn take_conn(&mut self) -> Result<Connection> {
        self.conn
            .take()
            .ok_or(HandshakeError::Closed("connection already closed".into()))
    }

    pub(crate) fn set_conn(&mut self, conn: Connection) {
        self.conn = Some(conn);
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or(HandshakeError::Closed("connection already closed".into()))
    }

    /// Send a control message.
    ///
    /// # Errors
    ///
    /// Returns an encoding or transport error.
    pub async fn send<M: ControlMessage>(&mut self, message: &M) -> Result<()> {
        let packet = Packet::control(self.local_id, message)?;
        self.send_packet(&packet).await
    }

    /// Send a raw packet.
    ///
    /// # Errors
    ///
    /// Returns an encoding or transport error.
    pub async fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let bytes = packet.to_bytes()?;
        self.conn_mut()?.send_frame(&bytes).await?;
        Ok(())
    }

    /// Receive the next packet.
    ///
    /// # Errors
    ///
    /// Returns a transport error, or a decode error for a malformed packet.
    pub async fn recv_packet(&mut self) -> Result<Packet> {
        let frame = self.conn_mut()?.recv_frame().await?;
        Packet::from_bytes(&frame)
    }

    /// Close the connection, logging `cause`. Further sends and receives
    /// fail with [`HandshakeError::Closed`].
    pub async fn close(&mut self, cause: &HandshakeError) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        tracing::warn!("Closing {} ({}): {}", self, cause.category(), cause);
        if let Err(e) = conn.close().await {
            tracing::debug!("Shutdown of {} failed: {}", self, e);
        }
        self.secure_key = None;
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Hand the authenticated connection over.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidState`] if the peer was never
    /// authenticated, or [`HandshakeError::Closed`] if it was closed.
    pub fn into_ready(mut self) -> Result<ReadyPeer> {
        let id = self
            .id
            .ok_or(HandshakeError::out_of_order("peer finished the chain unauthenticated"))?;
        let conn = self.take_conn()?;
        Ok(ReadyPeer {
            info: PeerInfo {
                id,
                channel: std::mem::take(&mut self.channel),
                net_address: std::mem::take(&mut self.net_address),
                remote_addr: std::mem::take(&mut self.remote_addr),
                outbound: self.outbound,
                kind: conn.kind(),
                secure_suite: self.secure_suite,
                aead_suite: self.aead_suite,
                rtt: self.rtt.last(),
            },
            conn,
        })
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.outbound { "outbound" } else { "inbound" };
        match self.id {
            Some(id) => write!(f, "{} peer {} [{}]", direction, self.remote_addr, id.short()),
            None => write!(f, "{} peer {}", direction, self.remote_addr),
        }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("remote_addr", &self.remote_addr)
            .field("outbound", &self.outbound)
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("stage", &self.stage)
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

/// Summary of an authenticated peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Verified identity
    pub id: PeerId,
    /// Negotiated channel
    pub channel: String,
    /// Address the peer declared
    pub net_address: String,
    /// Socket-level address label
    pub remote_addr: String,
    /// Whether we dialed
    pub outbound: bool,
    /// Live transport
    pub kind: TransportKind,
    /// Negotiated transport suite
    pub secure_suite: SecureSuite,
    /// Negotiated AEAD suite
    pub aead_suite: AeadSuite,
    /// Last measured round trip
    pub rtt: Duration,
}

/// An authenticated peer, ready for application traffic.
#[derive(Debug)]
pub struct ReadyPeer {
    /// Handshake outcome
    pub info: PeerInfo,
    /// Upgraded connection
    pub conn: Connection,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::JoinRequest;
    use tokio::io::duplex;

    fn pair() -> (Peer, Peer) {
        let (a, b) = duplex(16 * 1024);
        (
            Peer::new(Connection::plain(a, 4096), PeerId::from_bytes([1; 32]), true, "b:1"),
            Peer::new(Connection::plain(b, 4096), PeerId::from_bytes([2; 32]), false, "a:1"),
        )
    }

    #[test]
    fn test_rtt() {
        let mut rtt = Rtt::default();
        assert_eq!(rtt.stop(), Duration::ZERO);
        assert_eq!(rtt.samples(), 0);

        rtt.record(Duration::from_millis(10));
        rtt.record(Duration::from_millis(30));
        assert_eq!(rtt.last(), Duration::from_millis(30));
        assert_eq!(rtt.average(), Duration::from_millis(20));

        rtt.start();
        let sample = rtt.stop();
        assert_eq!(rtt.last(), sample);
        assert_eq!(rtt.samples(), 3);
        // The timer is one-shot.
        assert_eq!(rtt.stop(), Duration::ZERO);
        assert_eq!(rtt.samples(), 3);
    }

    #[tokio::test]
    async fn test_send_stamps_local_id() {
        let (mut a, mut b) = pair();
        let msg = JoinRequest {
            channel: "main".into(),
            address: "a".into(),
        };
        a.send(&msg).await.unwrap();

        let packet = b.recv_packet().await.unwrap();
        assert_eq!(packet.src, a.local_id());
        assert_eq!(packet.decode::<JoinRequest>().unwrap(), msg);
    }

    #[tokio::test]
    async fn test_close_is_final() {
        let (mut a, mut b) = pair();
        a.close(&HandshakeError::config("test")).await;
        assert!(a.is_closed());
        assert!(matches!(a.kind(), Err(HandshakeError::Closed(_))));
        assert!(matches!(
            a.send(&JoinRequest::default()).await,
            Err(HandshakeError::Closed(_))
        ));

        let err = b.recv_packet().await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_into_ready_requires_identity() {
        let (a, _b) = pair();
        assert!(matches!(
            a.into_ready(),
            Err(HandshakeError::InvalidState(_))
        ));

        let (a, _b) = pair();
        let mut a = a.with_channel("blocks");
        a.set_id(PeerId::from_bytes([9; 32]));
        a.set_net_address("10.0.0.2:7000".into());
        let ready = a.into_ready().unwrap();
        assert_eq!(ready.info.id, PeerId::from_bytes([9; 32]));
        assert_eq!(ready.info.channel, "blocks");
        assert_eq!(ready.info.net_address, "10.0.0.2:7000");
        assert_eq!(ready.info.kind, TransportKind::Plain);
        assert!(ready.info.outbound);
    }

    #[test]
    fn test_display() {
        let (a, _b) = pair();
        assert_eq!(a.to_string(), "outbound peer b:1");
    }
}
