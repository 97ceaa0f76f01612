//! # Roster - Shared Set of Live Sessions
//!
//! The roster is the only shared mutable state in the relay. It holds, for
//! every registered session, the write half of its connection, its nickname
//! and its peer address.
//!
//! ## Locking
//!
//! Every operation (register, unregister, set_nickname, broadcast, list,
//! size, close_all) takes the same roster-wide `tokio::sync::Mutex`. A
//! broadcast holds it while it writes to every member, so:
//! - all sessions observe broadcasts in one total order
//! - membership cannot change half-way through a fan-out
//! - a nickname change is either fully before or fully after a broadcast
//!
//! ## Handles
//!
//! Members live in an arena of slots addressed by [`SessionHandle`], an index
//! plus a generation. Removing a member bumps the slot's generation, so a stale
//! handle never reaches whichever session reuses the slot later.

use std::fmt;
use std::net::SocketAddr;

use log::{debug, info};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::common::messages::{EncodeError, Frame};
use crate::server::metrics::RelayMetrics;

/// Write half of a member connection. Boxed so tests can register in-memory
/// pipes next to real sockets.
pub type PeerWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Generational reference to a roster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    index: u32,
    generation: u32,
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Snapshot of one member, as shown by the `jobs` console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub handle: SessionHandle,
    /// Join order; unique for the lifetime of the roster
    pub session_id: u64,
    pub nickname: Vec<u8>,
    pub addr: SocketAddr,
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("session {0} is not registered")]
    NotRegistered(SessionHandle),
}

struct Member {
    session_id: u64,
    nickname: Vec<u8>,
    addr: SocketAddr,
    writer: PeerWriter,
}

struct Slot {
    generation: u32,
    member: Option<Member>,
}

#[derive(Default)]
struct Members {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Live handles in join order
    order: Vec<SessionHandle>,
    next_session_id: u64,
}

impl Members {
    fn get(&self, handle: SessionHandle) -> Option<&Member> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.member.as_ref()
    }

    fn get_mut(&mut self, handle: SessionHandle) -> Option<&mut Member> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.member.as_mut()
    }

    fn insert(&mut self, member: Member) -> SessionHandle {
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.member = Some(member);
                SessionHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    member: Some(member),
                });
                SessionHandle {
                    index,
                    generation: 0,
                }
            }
        };
        self.order.push(handle);
        handle
    }

    fn remove(&mut self, handle: SessionHandle) -> Option<Member> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let member = slot.member.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.order.retain(|h| *h != handle);
        Some(member)
    }

    /// Write `bytes` to every member in join order, ignoring individual failures.
    async fn fan_out(&mut self, bytes: &[u8]) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for &handle in &self.order {
            let Some(member) = self.slots[handle.index as usize].member.as_mut() else {
                continue;
            };
            match write_all_flush(&mut member.writer, bytes).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    // That session's own receive loop notices the dead peer.
                    debug!(
                        "❌ Failed to deliver to session #{} ({}): {}",
                        member.session_id, member.addr, e
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

async fn write_all_flush(writer: &mut PeerWriter, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Concurrency-safe registry of connected sessions.
pub struct Roster {
    members: Mutex<Members>,
    metrics: RelayMetrics,
}

impl Roster {
    pub fn new(metrics: RelayMetrics) -> Self {
        Self {
            members: Mutex::new(Members::default()),
            metrics,
        }
    }

    /// Add a session and return its handle. Members are listed in the order
    /// they registered.
    pub async fn register(
        &self,
        writer: PeerWriter,
        addr: SocketAddr,
        nickname: Vec<u8>,
    ) -> SessionHandle {
        let mut members = self.members.lock().await;
        let session_id = members.next_session_id;
        members.next_session_id += 1;

        let handle = members.insert(Member {
            session_id,
            nickname,
            addr,
            writer,
        });

        info!(
            "👋 Session #{} from {} joined ({} online)",
            session_id,
            addr,
            members.order.len()
        );
        handle
    }

    /// Remove a session and close its connection.
    ///
    /// Returns `false` if `handle` no longer names a member, e.g. because
    /// [`close_all`](Self::close_all) already removed it.
    pub async fn unregister(&self, handle: SessionHandle) -> bool {
        let mut members = self.members.lock().await;
        let Some(mut member) = members.remove(handle) else {
            return false;
        };
        let _ = member.writer.shutdown().await;

        info!(
            "🔌 Session #{} from {} left ({} online)",
            member.session_id,
            member.addr,
            members.order.len()
        );
        true
    }

    /// Replace a member's nickname. Returns `false` for a stale handle.
    pub async fn set_nickname(&self, handle: SessionHandle, nickname: Vec<u8>) -> bool {
        let mut members = self.members.lock().await;
        match members.get_mut(handle) {
            Some(member) => {
                debug!(
                    "🏷️  Session #{} is now '{}'",
                    member.session_id,
                    String::from_utf8_lossy(&nickname)
                );
                member.nickname = nickname;
                true
            }
            None => false,
        }
    }

    pub async fn nickname(&self, handle: SessionHandle) -> Option<Vec<u8>> {
        let members = self.members.lock().await;
        members.get(handle).map(|m| m.nickname.clone())
    }

    /// Encode `frame` once and write it to every member.
    ///
    /// A failed write to one member is counted and skipped; it neither stops
    /// the fan-out nor removes that member.
    pub async fn broadcast(&self, frame: &Frame) -> Result<BroadcastReport, EncodeError> {
        let bytes = frame.encode()?;
        let mut members = self.members.lock().await;
        let report = members.fan_out(&bytes).await;
        self.metrics.broadcast_sent(report.delivered, report.failed);
        Ok(report)
    }

    /// Broadcast `body` under the current nickname of `from`.
    ///
    /// The nickname lookup and the fan-out share one critical section, so the
    /// label always matches the latest completed `set_nickname`.
    pub async fn broadcast_text(
        &self,
        from: SessionHandle,
        body: Vec<u8>,
    ) -> Result<BroadcastReport, BroadcastError> {
        let mut members = self.members.lock().await;
        let sender = members
            .get(from)
            .ok_or(BroadcastError::NotRegistered(from))?
            .nickname
            .clone();

        let bytes = Frame::Broadcast { sender, body }.encode()?;
        let report = members.fan_out(&bytes).await;
        self.metrics.broadcast_sent(report.delivered, report.failed);
        Ok(report)
    }

    /// Members in join order.
    pub async fn list(&self) -> Vec<MemberInfo> {
        let members = self.members.lock().await;
        members
            .order
            .iter()
            .filter_map(|&handle| {
                members.get(handle).map(|m| MemberInfo {
                    handle,
                    session_id: m.session_id,
                    nickname: m.nickname.clone(),
                    addr: m.addr,
                })
            })
            .collect()
    }

    pub async fn size(&self) -> usize {
        self.members.lock().await.order.len()
    }

    /// Remove every member and close its connection. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let mut members = self.members.lock().await;
        let handles = std::mem::take(&mut members.order);
        let mut closed = 0;

        for handle in handles {
            if let Some(mut member) = members.remove(handle) {
                let _ = member.writer.shutdown().await;
                closed += 1;
            }
        }

        if closed > 0 {
            info!("🧹 Closed {} session(s)", closed);
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// Register an in-memory member and return the peer end to read from.
    async fn join(roster: &Roster, port: u16, nickname: &str) -> (SessionHandle, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(4096);
        let handle = roster
            .register(Box::new(ours), addr(port), nickname.as_bytes().to_vec())
            .await;
        (handle, theirs)
    }

    async fn read_exactly(peer: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        peer.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_register_and_list_in_join_order() {
        let roster = Roster::new(RelayMetrics::new());
        let (a, _pa) = join(&roster, 1001, "alice").await;
        let (b, _pb) = join(&roster, 1002, "bob").await;
        let (c, _pc) = join(&roster, 1003, "carol").await;

        assert_eq!(roster.size().await, 3);

        let listed = roster.list().await;
        let handles: Vec<_> = listed.iter().map(|m| m.handle).collect();
        assert_eq!(handles, vec![a, b, c]);
        assert_eq!(listed[1].nickname, b"bob".to_vec());
        assert_eq!(listed[2].addr, addr(1003));
        assert_eq!(
            listed.iter().map(|m| m.session_id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_unregister_closes_connection() {
        let roster = Roster::new(RelayMetrics::new());
        let (a, mut pa) = join(&roster, 1001, "alice").await;

        assert!(roster.unregister(a).await);
        assert_eq!(roster.size().await, 0);

        let mut buf = [0u8; 8];
        assert_eq!(pa.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stale_handle_does_not_touch_slot_reuser() {
        let roster = Roster::new(RelayMetrics::new());
        let (a, _pa) = join(&roster, 1001, "alice").await;
        assert!(roster.unregister(a).await);

        // Reuses the freed slot with a newer generation.
        let (b, _pb) = join(&roster, 1002, "bob").await;
        assert_ne!(a, b);

        assert!(!roster.unregister(a).await);
        assert!(!roster.set_nickname(a, b"mallory".to_vec()).await);
        assert_eq!(roster.size().await, 1);
        assert_eq!(roster.nickname(b).await, Some(b"bob".to_vec()));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let roster = Roster::new(RelayMetrics::new());
        let (_a, mut pa) = join(&roster, 1001, "alice").await;
        let (_b, mut pb) = join(&roster, 1002, "bob").await;

        let frame = Frame::Broadcast {
            sender: b"alice".to_vec(),
            body: b"hi".to_vec(),
        };
        let expected = frame.encode().unwrap();
        let report = roster.broadcast(&frame).await.unwrap();
        assert_eq!(
            report,
            BroadcastReport {
                delivered: 2,
                failed: 0
            }
        );

        assert_eq!(read_exactly(&mut pa, expected.len()).await, expected);
        assert_eq!(read_exactly(&mut pb, expected.len()).await, expected);
    }

    #[tokio::test]
    async fn test_broadcast_skips_dead_peer_without_removing_it() {
        let metrics = RelayMetrics::new();
        let roster = Roster::new(metrics.clone());
        let (_a, mut pa) = join(&roster, 1001, "alice").await;
        let (_b, pb) = join(&roster, 1002, "bob").await;
        let (_c, mut pc) = join(&roster, 1003, "carol").await;
        drop(pb);

        let frame = Frame::Broadcast {
            sender: b"alice".to_vec(),
            body: b"anyone?".to_vec(),
        };
        let expected = frame.encode().unwrap();
        let report = roster.broadcast(&frame).await.unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(roster.size().await, 3);

        assert_eq!(read_exactly(&mut pa, expected.len()).await, expected);
        assert_eq!(read_exactly(&mut pc, expected.len()).await, expected);

        let snap = metrics.snapshot();
        assert_eq!(snap.broadcasts, 1);
        assert_eq!(snap.write_failures, 1);
    }

    #[tokio::test]
    async fn test_broadcast_text_uses_current_nickname() {
        let roster = Roster::new(RelayMetrics::new());
        let (a, mut pa) = join(&roster, 1001, "alice").await;

        roster.broadcast_text(a, b"one".to_vec()).await.unwrap();
        roster.set_nickname(a, b"al".to_vec()).await;
        roster.broadcast_text(a, b"two".to_vec()).await.unwrap();

        let first = Frame::Broadcast {
            sender: b"alice".to_vec(),
            body: b"one".to_vec(),
        }
        .encode()
        .unwrap();
        let second = Frame::Broadcast {
            sender: b"al".to_vec(),
            body: b"two".to_vec(),
        }
        .encode()
        .unwrap();

        assert_eq!(read_exactly(&mut pa, first.len()).await, first);
        assert_eq!(read_exactly(&mut pa, second.len()).await, second);
    }

    #[tokio::test]
    async fn test_broadcast_text_rejects_oversized_body() {
        let roster = Roster::new(RelayMetrics::new());
        let (a, _pa) = join(&roster, 1001, "alice").await;

        let err = roster.broadcast_text(a, vec![b'x'; 256]).await.unwrap_err();
        assert!(matches!(err, BroadcastError::Encode(_)));

        roster.unregister(a).await;
        let err = roster.broadcast_text(a, b"hi".to_vec()).await.unwrap_err();
        assert!(matches!(err, BroadcastError::NotRegistered(h) if h == a));
    }

    #[tokio::test]
    async fn test_close_all() {
        let roster = Roster::new(RelayMetrics::new());
        let (a, mut pa) = join(&roster, 1001, "alice").await;
        let (_b, mut pb) = join(&roster, 1002, "bob").await;

        assert_eq!(roster.close_all().await, 2);
        assert_eq!(roster.size().await, 0);
        assert!(roster.list().await.is_empty());

        let mut buf = [0u8; 4];
        assert_eq!(pa.read(&mut buf).await.unwrap(), 0);
        assert_eq!(pb.read(&mut buf).await.unwrap(), 0);

        // The session loop finding itself already gone is harmless.
        assert!(!roster.unregister(a).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_size_tracks_concurrent_churn() {
        let roster = Arc::new(Roster::new(RelayMetrics::new()));
        let mut tasks = Vec::new();

        for i in 0..64u16 {
            let roster = roster.clone();
            tasks.push(tokio::spawn(async move {
                let (ours, _theirs) = tokio::io::duplex(64);
                let handle = roster
                    .register(Box::new(ours), addr(2000 + i), b"guest".to_vec())
                    .await;
                // Odd sessions leave again.
                if i % 2 == 1 {
                    assert!(roster.unregister(handle).await);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(roster.size().await, 32);
        assert_eq!(roster.list().await.len(), 32);
    }
}
