//! Length-prefixed frame codec.
//!
//! ```text
//! +----------------+------------------+
//! | length (u32 BE)| body (length B)  |
//! +----------------+------------------+
//! ```
//!
//! Reads are exact: nothing past the end of a frame is consumed, so a
//! stream can be handed to a TLS or record layer right after a frame.

use crate::transport::{TransportError, TransportResult};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix.
pub const HEADER_SIZE: usize = 4;

/// Encode a frame into a single buffer.
///
/// # Errors
///
/// Returns [`TransportError::FrameTooLarge`] if `body` exceeds `max`.
pub fn encode_frame(body: &[u8], max: usize) -> TransportResult<Vec<u8>> {
    let len = u32::try_from(body.len())
        .ok()
        .filter(|_| body.len() <= max)
        .ok_or(TransportError::FrameTooLarge {
            size: body.len(),
            max,
        })?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(body);
    Ok(buf)
}

/// Write one frame and flush.
///
/// # Errors
///
/// Returns [`TransportError::FrameTooLarge`] or an I/O error.
pub async fn write_frame<W>(writer: &mut W, body: &[u8], max: usize) -> TransportResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let buf = encode_frame(body, max)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// # Errors
///
/// Returns [`TransportError::Closed`] on a clean end of stream before a
/// header, [`TransportError::FrameTooLarge`] if the declared length exceeds
/// `max`, or an I/O error (including end of stream mid-frame).
pub async fn read_frame<R>(reader: &mut R, max: usize) -> TransportResult<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(TransportError::Closed),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > max {
        return Err(TransportError::FrameTooLarge { size: len, max });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frames_in_order() {
        let (mut a, mut b) = duplex(1024);

        write_frame(&mut a, b"first", 64).await.unwrap();
        write_frame(&mut a, b"", 64).await.unwrap();
        write_frame(&mut a, b"third", 64).await.unwrap();

        assert_eq!(read_frame(&mut b, 64).await.unwrap(), b"first");
        assert_eq!(read_frame(&mut b, 64).await.unwrap(), b"");
        assert_eq!(read_frame(&mut b, 64).await.unwrap(), b"third");
    }

    #[tokio::test]
    async fn test_read_does_not_overconsume() {
        let (mut a, mut b) = duplex(1024);

        write_frame(&mut a, b"frame", 64).await.unwrap();
        a.write_all(b"raw tail").await.unwrap();

        assert_eq!(read_frame(&mut b, 64).await.unwrap(), b"frame");
        let mut tail = [0u8; 8];
        b.read_exact(&mut tail).await.unwrap();
        assert_eq!(&tail, b"raw tail");
    }

    #[tokio::test]
    async fn test_limits() {
        assert!(matches!(
            encode_frame(&[0u8; 65], 64),
            Err(TransportError::FrameTooLarge { size: 65, max: 64 })
        ));

        let (mut a, mut b) = duplex(1024);
        write_frame(&mut a, &[0u8; 100], 1000).await.unwrap();
        assert!(matches!(
            read_frame(&mut b, 50).await,
            Err(TransportError::FrameTooLarge { size: 100, max: 50 })
        ));
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let (a, mut b) = duplex(64);
        drop(a);
        assert!(matches!(
            read_frame(&mut b, 64).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_truncated_body_is_io_error() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&10u32.to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        let err = read_frame(&mut b, 64).await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(err.is_closed());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn header_matches_body(body in proptest::collection::vec(any::<u8>(), 0..2048), max in 0usize..4096) {
                match encode_frame(&body, max) {
                    Ok(buf) => {
                        prop_assert!(body.len() <= max);
                        prop_assert_eq!(buf.len(), HEADER_SIZE + body.len());
                        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
                        prop_assert_eq!(len, body.len());
                        prop_assert_eq!(&buf[HEADER_SIZE..], &body[..]);
                    }
                    Err(TransportError::FrameTooLarge { size, .. }) => {
                        prop_assert!(body.len() > max);
                        prop_assert_eq!(size, body.len());
                    }
                    Err(e) => prop_assert!(false, "unexpected error {e}"),
                }
            }
        }
    }
}
