//! # Chat Client
//!
//! A plain protocol consumer of the relay: it names itself, sends chat lines
//! and reads back the broadcasts the relay fans out (its own included).
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut client = ChatClient::connect("127.0.0.1:8089").await?;
//! client.set_nickname("alice").await?;
//! client.send_text("hi").await?;
//! while let Some(line) = client.recv().await? {
//!     println!("{}", line);
//! }
//! ```
//!
//! The relay reads one frame per socket read. Two frames written back to back
//! can land in a single read on the relay's side, so callers that need a
//! nickname change to apply before the next line should leave a gap between
//! them (the interactive client gets this for free from typing speed).

use std::fmt;

use anyhow::{Context, Result};
use log::info;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::common::connection::{read_broadcast, write_frame, Connection};
use crate::common::messages::Frame;

/// One relayed chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub sender: Vec<u8>,
    pub body: Vec<u8>,
}

impl ChatLine {
    pub fn new(sender: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
        }
    }

    fn from_frame(frame: Frame) -> Option<Self> {
        match frame {
            Frame::Broadcast { sender, body } => Some(Self { sender, body }),
            _ => None,
        }
    }
}

impl fmt::Display for ChatLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            String::from_utf8_lossy(&self.sender),
            String::from_utf8_lossy(&self.body)
        )
    }
}

/// A connected chat client.
pub struct ChatClient {
    conn: Connection,
}

impl ChatClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .context("failed to connect to relay")?;
        if let Ok(peer) = stream.peer_addr() {
            info!("🤝 Connected to relay at {}", peer);
        }
        Ok(Self {
            conn: Connection::new(stream),
        })
    }

    /// Ask the relay to label our future lines with `nickname` (at most 255 bytes).
    pub async fn set_nickname(&mut self, nickname: &str) -> Result<()> {
        self.conn
            .write_frame(&Frame::SetNickname {
                name: nickname.as_bytes().to_vec(),
            })
            .await
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.conn
            .write_frame(&Frame::SendText {
                body: text.as_bytes().to_vec(),
            })
            .await
    }

    /// Next relayed line, or `None` once the relay closes the connection.
    pub async fn recv(&mut self) -> Result<Option<ChatLine>> {
        Ok(self.conn.read_broadcast().await?.and_then(ChatLine::from_frame))
    }

    /// Split into a receiving half and a sending half for use from two tasks.
    pub fn into_split(self) -> (ChatReceiver, ChatSender) {
        let (reader, writer) = self.conn.into_split();
        (ChatReceiver { reader }, ChatSender { writer })
    }
}

pub struct ChatReceiver {
    reader: OwnedReadHalf,
}

impl ChatReceiver {
    pub async fn recv(&mut self) -> Result<Option<ChatLine>> {
        Ok(read_broadcast(&mut self.reader)
            .await?
            .and_then(ChatLine::from_frame))
    }
}

pub struct ChatSender {
    writer: OwnedWriteHalf,
}

impl ChatSender {
    pub async fn set_nickname(&mut self, nickname: &str) -> Result<()> {
        let frame = Frame::SetNickname {
            name: nickname.as_bytes().to_vec(),
        };
        write_frame(&mut self.writer, &frame).await
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        let frame = Frame::SendText {
            body: text.as_bytes().to_vec(),
        };
        write_frame(&mut self.writer, &frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_line_display() {
        let line = ChatLine::new("alice", "hi");
        assert_eq!(line.to_string(), "alice: hi");
    }

    #[test]
    fn test_chat_line_from_frame() {
        let frame = Frame::Broadcast {
            sender: b"bob".to_vec(),
            body: b"yo".to_vec(),
        };
        assert_eq!(ChatLine::from_frame(frame), Some(ChatLine::new("bob", "yo")));
        assert_eq!(ChatLine::from_frame(Frame::Null), None);
    }
}
