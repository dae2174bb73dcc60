//! A peer connection whose transport can be swapped in place.
//!
//! [`Connection`] starts [`Plain`](TransportKind::Plain). The handshake
//! replaces it with a [`SecureConn`] or a [`TlsConn`]; upgrading an
//! already-secured connection is refused.

use crate::frame::{read_frame, write_frame};
use crate::secure::SecureConn;
use crate::tls::{self, TlsConn, TlsCredentials, TlsRole};
use crate::transport::{
    AsyncStream, BoxedStream, FrameTransport, TransportError, TransportKind, TransportResult,
    TransportStats,
};
use async_trait::async_trait;
use peerlink_crypto::{AeadSuite, RecordCipher};
use tokio::io::AsyncWriteExt;

/// Unencrypted framed stream.
pub struct PlainConn {
    stream: BoxedStream,
    max_frame_size: usize,
    stats: TransportStats,
}

#[async_trait]
impl FrameTransport for PlainConn {
    async fn send_frame(&mut self, frame: &[u8]) -> TransportResult<()> {
        write_frame(&mut self.stream, frame, self.max_frame_size).await?;
        self.stats.record_send(frame.len());
        Ok(())
    }

    async fn recv_frame(&mut self) -> TransportResult<Vec<u8>> {
        let frame = read_frame(&mut self.stream, self.max_frame_size).await?;
        self.stats.record_recv(frame.len());
        Ok(frame)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Plain
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

/// The live transport of one peer connection.
pub enum Connection {
    /// Before key exchange
    Plain(PlainConn),
    /// ECDHE record layer
    Secure(SecureConn),
    /// TLS 1.3
    Tls(Box<TlsConn>),
}

impl Connection {
    /// Wrap a freshly connected stream.
    pub fn plain<S: AsyncStream + 'static>(stream: S, max_frame_size: usize) -> Self {
        Self::Plain(PlainConn {
            stream: Box::new(stream),
            max_frame_size,
            stats: TransportStats::default(),
        })
    }

    fn into_plain(self) -> TransportResult<PlainConn> {
        match self {
            Self::Plain(conn) => Ok(conn),
            other => Err(TransportError::AlreadySecured(other.kind())),
        }
    }

    /// Replace the plain transport with the AEAD record layer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadySecured`] if the connection is not
    /// plain; the connection is dropped in that case.
    pub fn upgrade_secure(self, cipher: RecordCipher) -> TransportResult<Self> {
        let plain = self.into_plain()?;
        Ok(Self::Secure(SecureConn::new(
            plain.stream,
            cipher,
            plain.max_frame_size,
        )))
    }

    /// Replace the plain transport with TLS, running the handshake in `role`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadySecured`] if the connection is not
    /// plain, or the handshake error.
    pub async fn upgrade_tls(
        self,
        role: TlsRole,
        creds: &TlsCredentials,
        aead: AeadSuite,
    ) -> TransportResult<Self> {
        let plain = self.into_plain()?;
        let conn = tls::handshake(plain.stream, role, creds, aead, plain.max_frame_size).await?;
        Ok(Self::Tls(Box::new(conn)))
    }

    fn inner(&mut self) -> &mut dyn FrameTransport {
        match self {
            Self::Plain(c) => c,
            Self::Secure(c) => c,
            Self::Tls(c) => c.as_mut(),
        }
    }
}

#[async_trait]
impl FrameTransport for Connection {
    async fn send_frame(&mut self, frame: &[u8]) -> TransportResult<()> {
        self.inner().send_frame(frame).await
    }

    async fn recv_frame(&mut self) -> TransportResult<Vec<u8>> {
        self.inner().recv_frame().await
    }

    fn kind(&self) -> TransportKind {
        match self {
            Self::Plain(_) => TransportKind::Plain,
            Self::Secure(_) => TransportKind::Secure,
            Self::Tls(_) => TransportKind::Tls,
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.inner().close().await
    }

    fn stats(&self) -> TransportStats {
        match self {
            Self::Plain(c) => c.stats(),
            Self::Secure(c) => c.stats(),
            Self::Tls(c) => c.stats(),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("kind", &self.kind())
            .field("stats", &self.stats())
            .finish()
    }
}
