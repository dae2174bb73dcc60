//! Error types for the peer handshake.
//!
//! Every handshake error is fatal for the connection it occurred on: the
//! chain reports it to the failing handler, closes the connection and hands
//! the error back to the caller. [`HandshakeError::category`] groups variants
//! for logging and metrics.

use crate::message::SecureError;
use peerlink_crypto::CryptoError;
use peerlink_transport::{TransportError, TransportKind};
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for handshake operations
pub type Result<T> = std::result::Result<T, HandshakeError>;

/// Handshake errors
#[derive(Debug, Error)]
pub enum HandshakeError {
    // ============ Decoding ============
    /// Malformed packet or control message
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),

    // ============ Negotiation ============
    /// No acceptable suite could be agreed on
    #[error("suite negotiation failed: {0}")]
    Negotiation(Cow<'static, str>),

    /// Remote answered a secure request with an error code
    #[error("remote refused key exchange: {0}")]
    SecureRejected(SecureError),

    /// Key exchange requested on a connection that is already secured
    #[error("connection already secured ({0})")]
    AlreadySecured(TransportKind),

    // ============ Identity ============
    /// Remote rejected our signature
    #[error("remote rejected signature: {0}")]
    Rejected(String),

    /// Remote signature did not verify
    #[error("signature verification failed: {0}")]
    Signature(CryptoError),

    /// Key exchange or key derivation failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    // ============ Transport ============
    /// Connection-level failure, including TLS
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Handshake did not finish in time
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// Connection is gone or the ready queue has no receiver
    #[error("closed: {0}")]
    Closed(Cow<'static, str>),

    // ============ Protocol ============
    /// Message arrived in a state that cannot accept it
    #[error("protocol violation: {0}")]
    InvalidState(Cow<'static, str>),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),
}

/// Coarse classification of a [`HandshakeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed payload
    Decode,
    /// No common suite, or a refused key exchange
    Negotiation,
    /// Bad signature, bad key, failed derivation
    Cryptographic,
    /// I/O, TLS, timeouts
    Transport,
    /// Out-of-order messages and configuration errors
    Protocol,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Decode => "decode",
            Self::Negotiation => "negotiation",
            Self::Cryptographic => "cryptographic",
            Self::Transport => "transport",
            Self::Protocol => "protocol",
        })
    }
}

impl HandshakeError {
    /// Which category this error belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Decode(_) => ErrorCategory::Decode,
            Self::Negotiation(_) | Self::SecureRejected(_) | Self::AlreadySecured(_) => {
                ErrorCategory::Negotiation
            }
            Self::Rejected(_) | Self::Signature(_) | Self::Crypto(_) => {
                ErrorCategory::Cryptographic
            }
            // Record-layer failures are reported by the transport but are
            // authentication failures.
            Self::Transport(TransportError::Crypto(_)) => ErrorCategory::Cryptographic,
            Self::Transport(_) | Self::Timeout(_) | Self::Closed(_) => ErrorCategory::Transport,
            Self::InvalidState(_) | Self::InvalidConfig(_) => ErrorCategory::Protocol,
        }
    }

    /// Whether the remote simply went away.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_closed(),
            Self::Closed(_) => true,
            _ => false,
        }
    }

    // ============ Convenience Constructors ============

    /// Protocol-order violation with a static description.
    #[must_use]
    pub const fn out_of_order(context: &'static str) -> Self {
        Self::InvalidState(Cow::Borrowed(context))
    }

    /// Negotiation failure with a static description.
    #[must_use]
    pub const fn negotiation(context: &'static str) -> Self {
        Self::Negotiation(Cow::Borrowed(context))
    }

    /// Configuration error with a static description.
    #[must_use]
    pub const fn config(context: &'static str) -> Self {
        Self::InvalidConfig(Cow::Borrowed(context))
    }
}
