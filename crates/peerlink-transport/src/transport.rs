//! Transport trait abstraction over the connection kinds.
//!
//! A peer connection starts as a plain framed stream and may be replaced,
//! exactly once, by an encrypted one. All three kinds expose the same
//! frame-level interface through [`FrameTransport`], and report which kind
//! they are through [`TransportKind`].

use async_trait::async_trait;
use peerlink_crypto::CryptoError;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Remote closed the stream
    #[error("connection closed")]
    Closed,

    /// Frame exceeds the configured limit
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Declared or attempted size
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Record layer failure
    #[error("record layer: {0}")]
    Crypto(#[from] CryptoError),

    /// TLS configuration or handshake failure
    #[error("tls: {0}")]
    Tls(String),

    /// Upgrade attempted on a connection that is already secured
    #[error("connection already secured ({0})")]
    AlreadySecured(TransportKind),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// Whether this error means the remote simply went away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Which transport currently carries a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Unencrypted framed stream
    Plain,
    /// AEAD record layer keyed by the ECDHE exchange
    Secure,
    /// TLS 1.3
    Tls,
}

impl TransportKind {
    /// Whether the transport encrypts traffic.
    #[must_use]
    pub fn is_secured(self) -> bool {
        !matches!(self, Self::Plain)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Secure => "secure",
            Self::Tls => "tls",
        })
    }
}

/// Duplex byte stream a connection can run over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Type-erased duplex stream.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Frame-oriented transport.
///
/// Frames are delivered whole and in order. Implementations are used by a
/// single task at a time.
#[async_trait]
pub trait FrameTransport: Send {
    /// Send one frame.
    ///
    /// # Errors
    /// Returns `TransportError` if the frame is too large or the write fails
    async fn send_frame(&mut self, frame: &[u8]) -> TransportResult<()>;

    /// Receive the next frame.
    ///
    /// # Errors
    /// Returns [`TransportError::Closed`] when the remote has closed the stream
    async fn recv_frame(&mut self) -> TransportResult<Vec<u8>>;

    /// Which transport this is.
    fn kind(&self) -> TransportKind;

    /// Shut down the write side.
    ///
    /// # Errors
    /// Returns `TransportError` if the shutdown fails
    async fn close(&mut self) -> TransportResult<()>;

    /// Get transport statistics.
    fn stats(&self) -> TransportStats;
}

/// Transport statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Total frame bytes sent (before encryption)
    pub bytes_sent: u64,
    /// Total frame bytes received (after decryption)
    pub bytes_received: u64,
    /// Frames sent
    pub frames_sent: u64,
    /// Frames received
    pub frames_received: u64,
}

impl TransportStats {
    pub(crate) fn record_send(&mut self, len: usize) {
        self.frames_sent += 1;
        self.bytes_sent += len as u64;
    }

    pub(crate) fn record_recv(&mut self, len: usize) {
        self.frames_received += 1;
        self.bytes_received += len as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display_and_secured() {
        assert_eq!(TransportKind::Plain.to_string(), "plain");
        assert_eq!(TransportKind::Secure.to_string(), "secure");
        assert_eq!(TransportKind::Tls.to_string(), "tls");
        assert!(!TransportKind::Plain.is_secured());
        assert!(TransportKind::Secure.is_secured());
        assert!(TransportKind::Tls.is_secured());
    }

    #[test]
    fn test_is_closed() {
        assert!(TransportError::Closed.is_closed());
        assert!(TransportError::Io(io::Error::from(io::ErrorKind::UnexpectedEof)).is_closed());
        assert!(!TransportError::Tls("bad".into()).is_closed());
    }

    #[test]
    fn test_stats_accumulate() {
        let mut stats = TransportStats::default();
        stats.record_send(10);
        stats.record_send(5);
        stats.record_recv(7);
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.bytes_sent, 15);
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.bytes_received, 7);
    }
}
