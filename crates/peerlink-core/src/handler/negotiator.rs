//! Channel negotiation stage.

use super::{Flow, PeerHandler};
use crate::error::Result;
use crate::message::{ControlMessage, JoinRequest, JoinResponse};
use crate::packet::Packet;
use crate::peer::Peer;
use async_trait::async_trait;

/// Agrees on a channel and swaps declared addresses.
///
/// The dialing side sends a [`JoinRequest`]; the accepting side adopts the
/// requested channel, echoes it back in a [`JoinResponse`] with its own
/// address, and both sides advance. Nothing here is authenticated.
#[derive(Debug, Clone, Default)]
pub struct ChannelNegotiator {
    address: String,
}

impl ChannelNegotiator {
    /// Negotiator announcing `address` as the local node's address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl PeerHandler for ChannelNegotiator {
    fn name(&self) -> &'static str {
        "channel-negotiator"
    }

    async fn on_peer(&self, peer: &mut Peer) -> Result<Flow> {
        if peer.is_outbound() {
            let request = JoinRequest {
                channel: peer.channel().to_owned(),
                address: self.address.clone(),
            };
            peer.send(&request).await?;
        }
        Ok(Flow::Stay)
    }

    async fn on_packet(&self, packet: &Packet, peer: &mut Peer) -> Result<Flow> {
        match packet.control_kind() {
            Some(JoinRequest::KIND) => {
                let request: JoinRequest = packet.decode()?;
                tracing::debug!(
                    "{} asks to join '{}' from {}",
                    peer,
                    request.channel,
                    request.address
                );
                peer.set_channel(request.channel);
                peer.set_net_address(request.address);

                let response = JoinResponse {
                    channel: peer.channel().to_owned(),
                    address: self.address.clone(),
                };
                peer.send(&response).await?;
                Ok(Flow::Advance)
            }
            Some(JoinResponse::KIND) => {
                let response: JoinResponse = packet.decode()?;
                tracing::debug!(
                    "{} joined '{}' from {}",
                    peer,
                    response.channel,
                    response.address
                );
                peer.set_channel(response.channel);
                peer.set_net_address(response.address);
                Ok(Flow::Advance)
            }
            _ => Ok(Flow::Forward),
        }
    }
}
