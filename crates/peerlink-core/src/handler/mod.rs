//! Handler chain.
//!
//! A handshake is an ordered list of [`PeerHandler`] stages. The chain keeps
//! a cursor on the [`Peer`] and feeds each received packet to the stage under
//! the cursor until that stage returns [`Flow::Advance`]. Stages never
//! re-enter: once the cursor moves past a stage it is done with the peer.
//!
//! ```text
//!   accept/dial ──► ChannelNegotiator ──► Authenticator ──► ReadyPeer
//!                     (join req/resp)     (key + sign)
//! ```

mod authenticator;
mod negotiator;

pub use authenticator::{Authenticator, DEFAULT_RTT_ACCURACY};
pub use negotiator::ChannelNegotiator;

use crate::error::{HandshakeError, Result};
use crate::packet::Packet;
use crate::peer::Peer;
use async_trait::async_trait;
use std::sync::Arc;

/// What the chain does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep feeding packets to this stage
    Stay,
    /// This stage is done; move to the next one
    Advance,
    /// Packet is not for this stage; drop it and keep reading
    Forward,
}

/// One stage of the handshake.
///
/// Calls for a single peer are strictly sequential. Handlers are shared
/// across peers, so any state they hold must be immutable or synchronized.
#[async_trait]
pub trait PeerHandler: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &'static str;

    /// Called when the peer enters this stage.
    async fn on_peer(&self, peer: &mut Peer) -> Result<Flow>;

    /// Called for each packet received while the peer is in this stage.
    async fn on_packet(&self, packet: &Packet, peer: &mut Peer) -> Result<Flow>;

    /// Called before the connection is closed because of `cause`.
    fn on_error(&self, cause: &HandshakeError, peer: &Peer, packet: Option<&Packet>) {
        match packet {
            Some(packet) => tracing::warn!(
                "{} failed for {} on {:?}: {}",
                self.name(),
                peer,
                packet,
                cause
            ),
            None => tracing::warn!("{} failed for {}: {}", self.name(), peer, cause),
        }
    }
}

/// Ordered handshake stages.
#[derive(Clone, Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn PeerHandler>>,
}

impl HandlerChain {
    /// Empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    #[must_use]
    pub fn with(mut self, handler: Arc<dyn PeerHandler>) -> Self {
        self.push(handler);
        self
    }

    /// Append a stage.
    pub fn push(&mut self, handler: Arc<dyn PeerHandler>) {
        self.handlers.push(handler);
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the chain has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Stage names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Drive `peer` from its current stage through the end of the chain.
    ///
    /// # Errors
    ///
    /// Returns the first error any stage reports. By then that stage's
    /// [`on_error`](PeerHandler::on_error) has run and the connection is
    /// closed.
    pub async fn run(&self, mut peer: Peer) -> Result<Peer> {
        while let Some(handler) = self.handlers.get(peer.stage) {
            let handler = handler.as_ref();
            tracing::debug!("{} entering {}", peer, handler.name());

            let mut flow = match handler.on_peer(&mut peer).await {
                Ok(flow) => flow,
                Err(e) => return Err(fail(handler, e, &mut peer, None).await),
            };

            while flow != Flow::Advance {
                let packet = match peer.recv_packet().await {
                    Ok(packet) => packet,
                    Err(e) => return Err(fail(handler, e, &mut peer, None).await),
                };
                tracing::trace!("{} received {:?}", peer, packet);

                flow = match handler.on_packet(&packet, &mut peer).await {
                    Ok(Flow::Forward) => {
                        tracing::debug!(
                            "{} dropped {:?} for {}",
                            handler.name(),
                            packet,
                            peer
                        );
                        Flow::Forward
                    }
                    Ok(flow) => flow,
                    Err(e) => return Err(fail(handler, e, &mut peer, Some(&packet)).await),
                };
            }

            tracing::debug!("{} finished {}", peer, handler.name());
            peer.stage += 1;
        }
        Ok(peer)
    }
}

async fn fail(
    handler: &dyn PeerHandler,
    cause: HandshakeError,
    peer: &mut Peer,
    packet: Option<&Packet>,
) -> HandshakeError {
    handler.on_error(&cause, peer, packet);
    peer.close(&cause).await;
    cause
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
