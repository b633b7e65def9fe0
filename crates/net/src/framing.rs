//! Length-prefixed frame I/O shared by [`crate::server_transport`] and
//! [`crate::client_transport`].
//!
//! ```text
//! u32 body_length
//! u8  body[body_length]
//! ```
//!
//! `body_length` is little-endian and does not include itself (a zero-length
//! body is a valid, if useless, frame).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;

/// Frames larger than this are rejected before an allocation is attempted.
/// Not part of the wire contract (a peer may declare any `u32` length); this
/// is a local guard against a corrupt or hostile length prefix.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let len = reader.read_u32_le().await?;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(len, MAX_FRAME_SIZE));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> Result<(), FrameError> {
    let len = body.len();
    if len as u64 > MAX_FRAME_SIZE as u64 {
        return Err(FrameError::TooLarge(len as u32, MAX_FRAME_SIZE));
    }
    writer.write_u32_le(len as u32).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn frame_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        assert_eq!(&buf[0..4], &5u32.to_le_bytes());
        let mut cursor = Cursor::new(buf);
        let body = read_frame(&mut cursor).await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_le_bytes());
        let mut cursor = Cursor::new(buf);
        assert!(read_frame(&mut cursor).await.is_err());
    }
}
