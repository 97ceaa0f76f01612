//! # Session - Per-Connection Receive Loop
//!
//! One session runs per accepted connection, as its own tokio task.
//!
//! ```text
//! Connected ──register──> Receiving ──frame──> Dispatching ─┐
//!                             ^                              │
//!                             └──────────────────────────────┘
//!                 read error / zero-byte read / shutdown ──> Terminated
//! ```
//!
//! The session owns the read half of its socket. The write half is handed to
//! the roster on registration and is only used there, by broadcasts and by
//! removal. Each successful read is decoded as exactly one frame.

use std::net::SocketAddr;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::common::messages::{DecodeError, Frame};
use crate::server::roster::{PeerWriter, SessionHandle};
use crate::server::server::RelayContext;

/// Reads shorter than this carry no payload and are ignored.
const MIN_FRAME_LEN: usize = 2;

/// Why a session loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Zero-byte read: the client closed its side.
    PeerClosed,
    /// The read itself failed (reset, aborted, ...).
    ReadError,
    /// The relay is shutting down.
    Shutdown,
}

pub struct Session<R> {
    reader: R,
    writer: PeerWriter,
    addr: SocketAddr,
    ctx: RelayContext,
}

impl<R> Session<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Prepare a session for a freshly accepted connection. Nothing is
    /// registered until [`run`](Self::run) starts.
    pub fn new(reader: R, writer: PeerWriter, addr: SocketAddr, ctx: RelayContext) -> Self {
        Self {
            reader,
            writer,
            addr,
            ctx,
        }
    }

    /// Register with the roster, then receive and dispatch frames until the
    /// connection ends. The session is unregistered exactly once on the way out.
    pub async fn run(self) -> SessionEnd {
        let Session {
            mut reader,
            writer,
            addr,
            mut ctx,
        } = self;

        let nickname = ctx.session.default_nickname.clone().into_bytes();
        let handle = ctx.roster.register(writer, addr, nickname).await;
        ctx.metrics.session_started();

        let mut buf = vec![0u8; ctx.session.recv_buffer_size.max(MIN_FRAME_LEN)];

        let end = loop {
            let read = tokio::select! {
                read = reader.read(&mut buf) => read,
                _ = ctx.shutdown_requested() => break SessionEnd::Shutdown,
            };

            match read {
                Ok(0) => break SessionEnd::PeerClosed,
                Ok(n) => dispatch(&ctx, handle, addr, &buf[..n]).await,
                Err(e) => {
                    debug!("❌ Session {} ({}) read error: {}", handle, addr, e);
                    break SessionEnd::ReadError;
                }
            }
        };

        // On shutdown close_all has usually removed us already; the
        // generational handle makes that a no-op.
        ctx.roster.unregister(handle).await;
        ctx.metrics.session_finished();

        debug!("🔚 Session {} ({}) ended: {:?}", handle, addr, end);
        end
    }
}

async fn dispatch(ctx: &RelayContext, handle: SessionHandle, addr: SocketAddr, data: &[u8]) {
    if data.len() < MIN_FRAME_LEN {
        return;
    }
    ctx.metrics.frame_received();

    match Frame::decode(data) {
        Ok(Frame::SetNickname { name }) => {
            ctx.roster.set_nickname(handle, name).await;
        }
        Ok(Frame::SendText { body }) => {
            match ctx.roster.broadcast_text(handle, body).await {
                Ok(report) => debug!(
                    "📤 Session {} broadcast to {} peer(s), {} failed",
                    handle, report.delivered, report.failed
                ),
                Err(e) => {
                    warn!("⚠️  Dropping text from session {} ({}): {}", handle, addr, e);
                    ctx.metrics.frame_rejected();
                }
            }
        }
        Ok(Frame::Null) => {}
        Ok(Frame::Broadcast { .. }) => {
            debug!("Session {} sent a relay-only Broadcast frame, ignoring", handle);
        }
        Err(DecodeError::UnknownTag(tag)) => {
            debug!("Session {} sent unknown tag {:#04x}, ignoring", handle, tag);
        }
        Err(e) => {
            warn!("⚠️  Malformed frame from session {} ({}): {}", handle, addr, e);
            ctx.metrics.frame_rejected();
        }
    }
}
