//! # PeerLink Transport
//!
//! Connection layer underneath the PeerLink handshake.
//!
//! This crate provides:
//! - A length-prefixed frame codec over any duplex byte stream
//! - [`Connection`], a connection whose transport can be upgraded in place
//!   from plain to one of two secure kinds
//! - The ECDHE secure transport: an AEAD record layer keyed from the
//!   handshake's [`SecureKey`](peerlink_crypto::SecureKey)
//! - The TLS 1.3 transport: rustls with a certificate key derived from
//!   the same handshake, pinned by the client

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod frame;
pub mod secure;
pub mod tls;
pub mod transport;

pub use connection::Connection;
pub use transport::{
    AsyncStream, BoxedStream, FrameTransport, TransportError, TransportKind, TransportResult,
    TransportStats,
};

/// Default upper bound on a single frame body, in bytes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;
