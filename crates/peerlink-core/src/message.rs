//! Control messages exchanged during the handshake.
//!
//! Each message type is bound to one [`ControlKind`] through
//! [`ControlMessage::KIND`], which is the sub-protocol id it travels under.

use crate::packet::ControlKind;
use peerlink_crypto::AeadSuite;
use peerlink_transport::TransportKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A message carried on the control protocol.
pub trait ControlMessage: Serialize + DeserializeOwned + Send + Sync {
    /// Sub-protocol id this message travels under.
    const KIND: ControlKind;
}

/// Transport security suite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecureSuite {
    /// No encryption; identities are still bound
    None,
    /// TLS 1.3 keyed from the exchange
    Tls,
    /// AEAD record layer keyed from the exchange
    Ecdhe,
    /// Placeholder for an absent choice. Ids this build does not know
    /// decode to it, so selection skips them.
    #[default]
    #[serde(other)]
    Unknown,
}

impl SecureSuite {
    /// Whether this suite encrypts the connection and so needs an AEAD suite.
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        matches!(self, Self::Tls | Self::Ecdhe)
    }

    /// Whether this is a real suite rather than the placeholder.
    #[must_use]
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Canonical name, as used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::None => "none",
            Self::Tls => "tls",
            Self::Ecdhe => "ecdhe",
        }
    }
}

impl fmt::Display for SecureSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TransportKind> for SecureSuite {
    fn from(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Plain => Self::None,
            TransportKind::Secure => Self::Ecdhe,
            TransportKind::Tls => Self::Tls,
        }
    }
}

/// Error code carried by [`SecureResponse`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecureError {
    /// Request accepted
    #[default]
    None,
    /// No acceptable suite
    Invalid,
    /// Connection is already secured
    AlreadyEstablished,
}

impl fmt::Display for SecureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Invalid => "invalid",
            Self::AlreadyEstablished => "already-established",
        })
    }
}

/// Opens channel negotiation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Requested channel
    pub channel: String,
    /// Sender's declared address
    pub address: String,
}

impl ControlMessage for JoinRequest {
    const KIND: ControlKind = ControlKind::JoinRequest;
}

/// Answers a [`JoinRequest`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    /// Joined channel
    pub channel: String,
    /// Responder's declared address
    pub address: String,
}

impl ControlMessage for JoinResponse {
    const KIND: ControlKind = ControlKind::JoinResponse;
}

/// Offers suites in preference order and the requester's public value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureRequest {
    /// Channel whose suite lists apply
    pub channel: String,
    /// Acceptable transport suites, most preferred first
    pub secure_suites: Vec<SecureSuite>,
    /// Acceptable AEAD suites, most preferred first
    pub aead_suites: Vec<AeadSuite>,
    /// X25519 public value
    pub param: Vec<u8>,
}

impl ControlMessage for SecureRequest {
    const KIND: ControlKind = ControlKind::KeyRequest;
}

/// Carries the responder's choice and public value, or an error code.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureResponse {
    /// Responder's channel
    pub channel: String,
    /// Chosen transport suite, or the live one on `AlreadyEstablished`
    pub secure_suite: SecureSuite,
    /// Chosen AEAD suite
    pub aead_suite: AeadSuite,
    /// X25519 public value; empty when `error` is set
    pub param: Vec<u8>,
    /// Outcome
    pub error: SecureError,
}

impl ControlMessage for SecureResponse {
    const KIND: ControlKind = ControlKind::KeyResponse;
}

/// Proves the requester's identity over the shared challenge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRequest {
    /// Ed25519 public key
    pub public_key: Vec<u8>,
    /// Signature over the shared challenge
    pub signature: Vec<u8>,
    /// Sender's measured round trip
    pub rtt: Duration,
}

impl ControlMessage for SignatureRequest {
    const KIND: ControlKind = ControlKind::SignRequest;
}

/// Proves the responder's identity, or explains why the request failed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResponse {
    /// Ed25519 public key; empty on error
    pub public_key: Vec<u8>,
    /// Signature over the shared challenge; empty on error
    pub signature: Vec<u8>,
    /// Sender's measured round trip
    pub rtt: Duration,
    /// Empty on success
    pub error: String,
}

impl ControlMessage for SignatureResponse {
    const KIND: ControlKind = ControlKind::SignResponse;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_properties() {
        assert!(SecureSuite::Ecdhe.is_encrypted());
        assert!(SecureSuite::Tls.is_encrypted());
        assert!(!SecureSuite::None.is_encrypted());
        assert!(!SecureSuite::Unknown.is_encrypted());
        assert!(SecureSuite::None.is_known());
        assert!(!SecureSuite::Unknown.is_known());
        assert_eq!(SecureSuite::default(), SecureSuite::Unknown);
    }

    #[test]
    fn test_suite_from_transport_kind() {
        assert_eq!(SecureSuite::from(TransportKind::Plain), SecureSuite::None);
        assert_eq!(SecureSuite::from(TransportKind::Secure), SecureSuite::Ecdhe);
        assert_eq!(SecureSuite::from(TransportKind::Tls), SecureSuite::Tls);
    }

    #[derive(Deserialize, Serialize)]
    struct Suites {
        secure: Vec<SecureSuite>,
        error: SecureError,
    }

    #[test]
    fn test_config_names() {
        let parsed: Suites = toml::from_str(
            r#"
            secure = ["ecdhe", "tls", "none"]
            error = "already-established"
            "#,
        )
        .unwrap();
        assert_eq!(
            parsed.secure,
            vec![SecureSuite::Ecdhe, SecureSuite::Tls, SecureSuite::None]
        );
        assert_eq!(parsed.error, SecureError::AlreadyEstablished);

        for suite in [SecureSuite::Ecdhe, SecureSuite::Tls, SecureSuite::None] {
            assert_eq!(suite.to_string(), suite.as_str());
        }
    }

    #[derive(Serialize)]
    struct RawSecureRequest {
        channel: String,
        secure_suites: Vec<u32>,
        aead_suites: Vec<u32>,
        param: Vec<u8>,
    }

    fn wire_id<T: Serialize>(value: &T) -> u32 {
        bincode::deserialize(&bincode::serialize(value).unwrap()).unwrap()
    }

    #[test]
    fn test_unrecognized_suite_ids_decode_as_unknown() {
        let raw = RawSecureRequest {
            channel: "main".into(),
            secure_suites: vec![41, wire_id(&SecureSuite::Ecdhe)],
            aead_suites: vec![wire_id(&AeadSuite::Aes128Gcm), 7],
            param: vec![5; 32],
        };
        let bytes = bincode::serialize(&raw).unwrap();
        let request: SecureRequest = bincode::deserialize(&bytes).unwrap();

        assert_eq!(
            request.secure_suites,
            vec![SecureSuite::Unknown, SecureSuite::Ecdhe]
        );
        assert_eq!(
            request.aead_suites,
            vec![AeadSuite::Aes128Gcm, AeadSuite::Unknown]
        );
        assert_eq!(request.param, vec![5; 32]);
    }

    #[test]
    fn test_kinds_are_distinct() {
        let kinds = [
            JoinRequest::KIND,
            JoinResponse::KIND,
            SecureRequest::KIND,
            SecureResponse::KIND,
            SignatureRequest::KIND,
            SignatureResponse::KIND,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_rtt_survives_encoding() {
        let msg = SignatureRequest {
            public_key: vec![1; 32],
            signature: vec![2; 64],
            rtt: Duration::from_micros(1_234),
        };
        let bytes = bincode::serialize(&msg).unwrap();
        let back: SignatureRequest = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.rtt, Duration::from_micros(1_234));
    }
}
