//! # Client-Side Connection
//!
//! Wraps a TCP stream to the relay and speaks the frame protocol from the
//! client's side of the wire.
//!
//! Outbound frames are written with a single `write_all` so the relay, which
//! treats each read as one frame, sees them whole. Inbound traffic is parsed
//! as a byte stream instead: `Broadcast` frames carry their own lengths, so
//! several of them arriving in one TCP segment are still split correctly.

use std::io;

use anyhow::{bail, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::messages::{Frame, TAG_BROADCAST, TAG_NULL};

/// TCP connection to the relay.
pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Read the next broadcast pushed by the relay.
    ///
    /// # Returns
    /// - `Ok(Some(Frame::Broadcast { .. }))`: a complete broadcast
    /// - `Ok(None)`: the relay closed the connection between frames
    /// - `Err`: I/O error, a close in the middle of a frame, or a tag the relay never sends
    pub async fn read_broadcast(&mut self) -> Result<Option<Frame>> {
        read_broadcast(&mut self.stream).await
    }

    /// Encode and send one frame.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        write_frame(&mut self.stream, frame).await
    }

    /// Split into independently owned read and write halves, so one task can
    /// print broadcasts while another sends.
    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.stream.into_split()
    }
}

/// Stream-parse one `Broadcast` from `reader`. `Null` padding is skipped.
pub async fn read_broadcast<R>(reader: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    loop {
        let tag = match reader.read_u8().await {
            Ok(tag) => tag,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match tag {
            TAG_NULL => continue,
            TAG_BROADCAST => {
                let sender = read_field(reader).await?;
                let body = read_field(reader).await?;
                return Ok(Some(Frame::Broadcast { sender, body }));
            }
            other => bail!("relay sent unexpected frame tag {:#04x}", other),
        }
    }
}

/// Encode `frame` and write it in one piece.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let data = frame.encode()?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_field<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u8().await? as usize;
    let mut value = vec![0u8; len];
    reader.read_exact(&mut value).await?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcast(sender: &str, body: &str) -> Frame {
        Frame::Broadcast {
            sender: sender.as_bytes().to_vec(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_coalesced_broadcasts_are_split() {
        let mut wire = Vec::new();
        wire.extend(broadcast("alice", "hi").encode().unwrap());
        wire.push(TAG_NULL);
        wire.extend(broadcast("bob", "hello").encode().unwrap());

        let mut reader = &wire[..];
        assert_eq!(
            read_broadcast(&mut reader).await.unwrap(),
            Some(broadcast("alice", "hi"))
        );
        assert_eq!(
            read_broadcast(&mut reader).await.unwrap(),
            Some(broadcast("bob", "hello"))
        );
        assert_eq!(read_broadcast(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_mid_frame_is_an_error() {
        let wire = b"\x03\x05ali".to_vec();
        let mut reader = &wire[..];
        assert!(read_broadcast(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_client_frame_tag_is_rejected() {
        let wire = b"\x02hello".to_vec();
        let mut reader = &wire[..];
        assert!(read_broadcast(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_write_frame_writes_encoded_bytes() {
        let mut out = Vec::new();
        write_frame(
            &mut out,
            &Frame::SendText {
                body: b"yo".to_vec(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out, b"\x02yo");
    }
}
