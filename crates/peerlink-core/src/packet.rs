//! Packet envelope.
//!
//! Every frame on a peer connection carries one bincode-encoded [`Packet`]:
//!
//! ```text
//! +-------------+------------------+-------------+-------------------+
//! | protocol u16| sub_protocol u16 | src PeerId  | payload (bytes)   |
//! +-------------+------------------+-------------+-------------------+
//! ```
//!
//! Handshake traffic uses [`PROTO_CONTROL`]; the sub-protocol id is the
//! [`ControlKind`] of the message in the payload.

use crate::error::Result;
use crate::identity::PeerId;
use crate::message::ControlMessage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol id of handshake control traffic.
pub const PROTO_CONTROL: u16 = 0;

/// Sub-protocol ids on [`PROTO_CONTROL`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ControlKind {
    /// [`JoinRequest`](crate::message::JoinRequest)
    JoinRequest = 1,
    /// [`JoinResponse`](crate::message::JoinResponse)
    JoinResponse = 2,
    /// [`SecureRequest`](crate::message::SecureRequest)
    KeyRequest = 3,
    /// [`SecureResponse`](crate::message::SecureResponse)
    KeyResponse = 4,
    /// [`SignatureRequest`](crate::message::SignatureRequest)
    SignRequest = 5,
    /// [`SignatureResponse`](crate::message::SignatureResponse)
    SignResponse = 6,
}

impl ControlKind {
    /// Sub-protocol id.
    #[must_use]
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Look up a sub-protocol id.
    #[must_use]
    pub const fn from_id(id: u16) -> Option<Self> {
        Some(match id {
            1 => Self::JoinRequest,
            2 => Self::JoinResponse,
            3 => Self::KeyRequest,
            4 => Self::KeyResponse,
            5 => Self::SignRequest,
            6 => Self::SignResponse,
            _ => return None,
        })
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::JoinRequest => "join-request",
            Self::JoinResponse => "join-response",
            Self::KeyRequest => "key-request",
            Self::KeyResponse => "key-response",
            Self::SignRequest => "sign-request",
            Self::SignResponse => "sign-response",
        }
    }
}

/// One wire message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Protocol id
    pub protocol: u16,
    /// Sub-protocol id within `protocol`
    pub sub_protocol: u16,
    /// Sender's self-declared id; not authenticated
    pub src: PeerId,
    /// Encoded message
    pub payload: Vec<u8>,
}

impl Packet {
    /// Wrap a control message.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Decode`](crate::HandshakeError::Decode) if
    /// the message cannot be encoded.
    pub fn control<M: ControlMessage>(src: PeerId, message: &M) -> Result<Self> {
        Ok(Self {
            protocol: PROTO_CONTROL,
            sub_protocol: M::KIND.id(),
            src,
            payload: bincode::serialize(message)?,
        })
    }

    /// The control message kind, if this is a control packet with a known
    /// sub-protocol.
    #[must_use]
    pub fn control_kind(&self) -> Option<ControlKind> {
        if self.protocol == PROTO_CONTROL {
            ControlKind::from_id(self.sub_protocol)
        } else {
            None
        }
    }

    /// Whether this packet carries a message of type `M`.
    #[must_use]
    pub fn is<M: ControlMessage>(&self) -> bool {
        self.control_kind() == Some(M::KIND)
    }

    /// Decode the payload as `M`.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Decode`](crate::HandshakeError::Decode) on
    /// a malformed payload.
    pub fn decode<M: ControlMessage>(&self) -> Result<M> {
        Ok(bincode::deserialize(&self.payload)?)
    }

    /// Encode for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Decode`](crate::HandshakeError::Decode) if
    /// encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from the wire.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Decode`](crate::HandshakeError::Decode) on
    /// malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Packet");
        match self.control_kind() {
            Some(kind) => s.field("kind", &kind.name()),
            None => s
                .field("protocol", &self.protocol)
                .field("sub_protocol", &self.sub_protocol),
        };
        s.field("src", &self.src)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{JoinRequest, SecureResponse, SecureSuite, SignatureResponse};

    #[test]
    fn test_kind_ids() {
        for id in 1..=6 {
            let kind = ControlKind::from_id(id).unwrap();
            assert_eq!(kind.id(), id);
        }
        assert_eq!(ControlKind::from_id(0), None);
        assert_eq!(ControlKind::from_id(7), None);
        assert_eq!(ControlKind::KeyRequest.name(), "key-request");
    }

    #[test]
    fn test_control_packet() {
        let src = PeerId::from_public_key(b"me");
        let msg = JoinRequest {
            channel: "main".into(),
            address: "10.0.0.1:7000".into(),
        };
        let packet = Packet::control(src, &msg).unwrap();
        assert_eq!(packet.protocol, PROTO_CONTROL);
        assert_eq!(packet.sub_protocol, 1);
        assert!(packet.is::<JoinRequest>());
        assert!(!packet.is::<SecureResponse>());

        let wire = packet.to_bytes().unwrap();
        let back = Packet::from_bytes(&wire).unwrap();
        assert_eq!(back, packet);
        assert_eq!(back.src, src);
        assert_eq!(back.decode::<JoinRequest>().unwrap(), msg);
    }

    #[test]
    fn test_foreign_protocol_has_no_kind() {
        let packet = Packet {
            protocol: 9,
            sub_protocol: 1,
            src: PeerId::default(),
            payload: Vec::new(),
        };
        assert_eq!(packet.control_kind(), None);
        assert!(!packet.is::<JoinRequest>());
        assert!(format!("{packet:?}").contains("protocol: 9"));
    }

    #[test]
    fn test_truncated_payload_is_decode_error() {
        let msg = SecureResponse {
            channel: "main".into(),
            secure_suite: SecureSuite::Ecdhe,
            param: vec![1; 32],
            ..Default::default()
        };
        let mut packet = Packet::control(PeerId::default(), &msg).unwrap();
        packet.payload.truncate(packet.payload.len() / 2);
        let err = packet.decode::<SecureResponse>().unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Decode);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(Packet::from_bytes(&[1, 2, 3]).is_err());
        let packet = Packet::control(PeerId::default(), &SignatureResponse::default()).unwrap();
        assert!(packet.decode::<SignatureResponse>().is_ok());
    }
}
