//! # Frame Protocol
//!
//! Defines the binary frames exchanged between chat clients and the relay.
//!
//! Every frame starts with a one-byte tag:
//!
//! ```text
//! 0x00  Null         (no payload, ignored)
//! 0x01  SetNickname  [len: u8] [name: len bytes]
//! 0x02  SendText     [body: every remaining byte of the read]
//! 0x03  Broadcast    [name_len: u8] [name] [body_len: u8] [body]
//! ```
//!
//! There is no outer length prefix: the relay treats each read from a socket
//! as exactly one frame. `SendText` relies on this, since its body length is
//! implied by the size of the read.
//!
//! Decoding is bounds-checked. A declared length that runs past the received
//! bytes is reported as [`DecodeError::Truncated`] and the frame is dropped.
//! Encoding refuses fields longer than [`MAX_FIELD_LEN`] instead of truncating
//! them, because every length field on the wire is a single byte.

use std::fmt;

use thiserror::Error;

/// Largest name or body a single-byte length field can describe.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

pub const TAG_NULL: u8 = 0x00;
pub const TAG_SET_NICKNAME: u8 = 0x01;
pub const TAG_SEND_TEXT: u8 = 0x02;
pub const TAG_BROADCAST: u8 = 0x03;

/// One decoded protocol message.
#[derive(Clone, PartialEq, Eq)]
pub enum Frame {
    /// Keep-alive style no-op. Carries nothing.
    Null,

    /// **Set Nickname** (client → relay)
    ///
    /// Replaces the display name of the sending session. Names are raw bytes,
    /// the relay never checks them for UTF-8 or uniqueness.
    SetNickname { name: Vec<u8> },

    /// **Send Text** (client → relay)
    ///
    /// A chat line to relay to everyone. The relay answers by broadcasting it
    /// under the sender's current nickname.
    SendText { body: Vec<u8> },

    /// **Broadcast** (relay → client)
    ///
    /// A chat line as delivered to every connected client, sender included.
    Broadcast { sender: Vec<u8>, body: Vec<u8> },
}

/// Reasons a received buffer could not be turned into a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,

    #[error("unknown frame tag {0:#04x}")]
    UnknownTag(u8),

    /// A length field (or the field it describes) runs past the end of the
    /// received bytes.
    #[error("truncated {field}: needed {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },
}

/// Reasons a [`Frame`] cannot be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("{field} is {len} bytes, the wire format allows at most {}", MAX_FIELD_LEN)]
    FieldTooLong { field: &'static str, len: usize },
}

impl Frame {
    /// The tag byte this frame is written with.
    pub fn tag(&self) -> u8 {
        match self {
            Frame::Null => TAG_NULL,
            Frame::SetNickname { .. } => TAG_SET_NICKNAME,
            Frame::SendText { .. } => TAG_SEND_TEXT,
            Frame::Broadcast { .. } => TAG_BROADCAST,
        }
    }

    /// Serialize the frame into its wire bytes.
    ///
    /// # Returns
    /// - `Ok(Vec<u8>)`: tag followed by the payload
    /// - `Err(EncodeError::FieldTooLong)`: a length-prefixed field exceeds 255 bytes
    ///
    /// # Example
    /// ```ignore
    /// let bytes = Frame::SetNickname { name: b"alice".to_vec() }.encode()?;
    /// assert_eq!(bytes, b"\x01\x05alice");
    /// ```
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = vec![self.tag()];

        match self {
            Frame::Null => {}
            Frame::SetNickname { name } => {
                put_field(&mut out, "nickname", name)?;
            }
            Frame::SendText { body } => {
                out.extend_from_slice(body);
            }
            Frame::Broadcast { sender, body } => {
                put_field(&mut out, "sender name", sender)?;
                put_field(&mut out, "broadcast body", body)?;
            }
        }

        Ok(out)
    }

    /// Parse one frame out of the bytes returned by a single read.
    ///
    /// Bytes following a complete `SetNickname` or `Broadcast` are ignored.
    ///
    /// # Example
    /// ```ignore
    /// match Frame::decode(&buf[..n])? {
    ///     Frame::SendText { body } => relay(body),
    ///     _ => {}
    /// }
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
        let (&tag, payload) = bytes.split_first().ok_or(DecodeError::Empty)?;

        match tag {
            TAG_NULL => Ok(Frame::Null),
            TAG_SET_NICKNAME => {
                let mut cursor = Cursor::new(payload);
                let name = cursor.field("nickname")?;
                Ok(Frame::SetNickname {
                    name: name.to_vec(),
                })
            }
            TAG_SEND_TEXT => Ok(Frame::SendText {
                body: payload.to_vec(),
            }),
            TAG_BROADCAST => {
                let mut cursor = Cursor::new(payload);
                let sender = cursor.field("sender name")?;
                let body = cursor.field("broadcast body")?;
                Ok(Frame::Broadcast {
                    sender: sender.to_vec(),
                    body: body.to_vec(),
                })
            }
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

impl fmt::Debug for Frame {
    // Names and bodies are nearly always text, so show them that way in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Null => f.write_str("Null"),
            Frame::SetNickname { name } => f
                .debug_struct("SetNickname")
                .field("name", &String::from_utf8_lossy(name))
                .finish(),
            Frame::SendText { body } => f
                .debug_struct("SendText")
                .field("body", &String::from_utf8_lossy(body))
                .finish(),
            Frame::Broadcast { sender, body } => f
                .debug_struct("Broadcast")
                .field("sender", &String::from_utf8_lossy(sender))
                .field("body", &String::from_utf8_lossy(body))
                .finish(),
        }
    }
}

fn put_field(out: &mut Vec<u8>, field: &'static str, value: &[u8]) -> Result<(), EncodeError> {
    let len = u8::try_from(value.len()).map_err(|_| EncodeError::FieldTooLong {
        field,
        len: value.len(),
    })?;
    out.push(len);
    out.extend_from_slice(value);
    Ok(())
}

/// Positional reader over a frame payload.
struct Cursor<'a> {
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Read a `u8` length followed by that many bytes.
    fn field(&mut self, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let (&len, rest) = self.bytes.split_first().ok_or(DecodeError::Truncated {
            field,
            needed: 1,
            available: 0,
        })?;
        let len = len as usize;
        if rest.len() < len {
            return Err(DecodeError::Truncated {
                field,
                needed: len,
                available: rest.len(),
            });
        }
        let (value, rest) = rest.split_at(len);
        self.bytes = rest;
        Ok(value)
    }
}
