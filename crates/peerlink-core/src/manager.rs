//! Connection manager.
//!
//! [`PeerManager`] runs the handshake chain for every accepted or dialed
//! stream on its own task, bounded by the handshake timeout. Authenticated
//! peers are recorded and handed to the application through the ready
//! queue. Nothing is retried here; a failed attempt is logged and its error
//! returned through the task's [`JoinHandle`].

use crate::config::HandshakeConfig;
use crate::error::{HandshakeError, Result};
use crate::handler::{Authenticator, ChannelNegotiator, HandlerChain};
use crate::identity::{Identity, PeerId};
use crate::peer::{Peer, PeerInfo, ReadyPeer};
use dashmap::DashMap;
use peerlink_transport::{AsyncStream, Connection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Runs handshakes and tracks authenticated peers.
#[derive(Debug, Clone)]
pub struct PeerManager {
    identity: Arc<Identity>,
    chain: Arc<HandlerChain>,
    peers: Arc<DashMap<PeerId, PeerInfo>>,
    ready_tx: mpsc::Sender<ReadyPeer>,
    timeout: Duration,
    max_frame_size: usize,
}

impl PeerManager {
    /// Build a manager and the receiving end of its ready queue.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidConfig`] if `config` does not
    /// validate or its key log file cannot be opened.
    pub fn new(
        config: &HandshakeConfig,
        identity: Identity,
    ) -> Result<(Self, mpsc::Receiver<ReadyPeer>)> {
        config.validate()?;
        let identity = Arc::new(identity);
        let chain = HandlerChain::new()
            .with(Arc::new(ChannelNegotiator::new(config.address.clone())))
            .with(Arc::new(Authenticator::from_config(
                Arc::clone(&identity),
                config,
            )?));
        let (ready_tx, ready_rx) = mpsc::channel(config.ready_queue);

        tracing::info!(
            "Peer manager for {} ready, stages {:?}",
            identity.peer_id(),
            chain.names()
        );
        Ok((
            Self {
                identity,
                chain: Arc::new(chain),
                peers: Arc::new(DashMap::new()),
                ready_tx,
                timeout: config.handshake_timeout(),
                max_frame_size: config.max_frame_size,
            },
            ready_rx,
        ))
    }

    /// Local identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Handshake an incoming stream.
    pub fn accept<S>(&self, stream: S, remote: impl Into<String>) -> JoinHandle<Result<PeerInfo>>
    where
        S: AsyncStream + 'static,
    {
        let peer = Peer::new(
            Connection::plain(stream, self.max_frame_size),
            self.identity.peer_id(),
            false,
            remote,
        );
        self.spawn(peer)
    }

    /// Handshake an outgoing stream, asking to join `channel`.
    pub fn dial<S>(
        &self,
        stream: S,
        channel: impl Into<String>,
        remote: impl Into<String>,
    ) -> JoinHandle<Result<PeerInfo>>
    where
        S: AsyncStream + 'static,
    {
        let peer = Peer::new(
            Connection::plain(stream, self.max_frame_size),
            self.identity.peer_id(),
            true,
            remote,
        )
        .with_channel(channel);
        self.spawn(peer)
    }

    fn spawn(&self, peer: Peer) -> JoinHandle<Result<PeerInfo>> {
        let chain = Arc::clone(&self.chain);
        let peers = Arc::clone(&self.peers);
        let ready_tx = self.ready_tx.clone();
        let timeout = self.timeout;
        let label = peer.to_string();

        tokio::spawn(async move {
            let peer = match tokio::time::timeout(timeout, chain.run(peer)).await {
                Ok(Ok(peer)) => peer,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    tracing::warn!("Handshake with {} timed out after {:?}", label, timeout);
                    return Err(HandshakeError::Timeout(timeout));
                }
            };

            let ready = peer.into_ready()?;
            let info = ready.info.clone();
            if peers.insert(info.id, info.clone()).is_some() {
                tracing::debug!("Replacing existing entry for {}", info.id.short());
            }
            tracing::info!(
                "Peer {} ready on '{}' via {} (rtt {:?})",
                info.id.short(),
                info.channel,
                info.kind,
                info.rtt
            );

            if ready_tx.send(ready).await.is_err() {
                peers.remove(&info.id);
                return Err(HandshakeError::Closed("ready queue has no receiver".into()));
            }
            Ok(info)
        })
    }

    /// Authenticated peers.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.peers.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Look up an authenticated peer.
    #[must_use]
    pub fn get(&self, id: &PeerId) -> Option<PeerInfo> {
        self.peers.get(id).map(|entry| entry.value().clone())
    }

    /// Forget a peer, e.g. after its connection dropped.
    pub fn remove(&self, id: &PeerId) -> Option<PeerInfo> {
        self.peers.remove(id).map(|(_, info)| info)
    }

    /// Number of authenticated peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peer is authenticated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
