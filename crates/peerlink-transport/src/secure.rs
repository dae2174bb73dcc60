//! ECDHE secure transport: AEAD records over the frame codec.
//!
//! Each frame body is sealed by the [`RecordCipher`] built from the
//! handshake's key exchange, then framed. Records carry no explicit nonce;
//! both ends count them, so loss or reordering fails authentication.

use crate::frame::{read_frame, write_frame};
use crate::transport::{
    BoxedStream, FrameTransport, TransportKind, TransportResult, TransportStats,
};
use async_trait::async_trait;
use peerlink_crypto::aead::{AeadSuite, RecordCipher, TAG_SIZE};
use tokio::io::AsyncWriteExt;

/// Connection wrapped in the AEAD record layer.
pub struct SecureConn {
    stream: BoxedStream,
    cipher: RecordCipher,
    max_frame_size: usize,
    stats: TransportStats,
}

impl SecureConn {
    /// Wrap `stream`; `max_frame_size` bounds plaintext frames.
    #[must_use]
    pub fn new(stream: BoxedStream, cipher: RecordCipher, max_frame_size: usize) -> Self {
        Self {
            stream,
            cipher,
            max_frame_size,
            stats: TransportStats::default(),
        }
    }

    /// The AEAD suite in use.
    #[must_use]
    pub fn suite(&self) -> AeadSuite {
        self.cipher.suite()
    }

    fn wire_limit(&self) -> usize {
        self.max_frame_size + TAG_SIZE
    }
}

#[async_trait]
impl FrameTransport for SecureConn {
    async fn send_frame(&mut self, frame: &[u8]) -> TransportResult<()> {
        if frame.len() > self.max_frame_size {
            return Err(crate::TransportError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_size,
            });
        }
        let sealed = self.cipher.seal(frame)?;
        let limit = self.wire_limit();
        write_frame(&mut self.stream, &sealed, limit).await?;
        self.stats.record_send(frame.len());
        Ok(())
    }

    async fn recv_frame(&mut self) -> TransportResult<Vec<u8>> {
        let limit = self.wire_limit();
        let sealed = read_frame(&mut self.stream, limit).await?;
        let frame = self.cipher.open(&sealed)?;
        self.stats.record_recv(frame.len());
        Ok(frame)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Secure
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}
