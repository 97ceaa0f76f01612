use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Relay counters, shared by clone between the listener, every session and
/// the console.
#[derive(Debug, Clone, Default)]
pub struct RelayMetrics {
    connections_accepted: Arc<AtomicU64>,
    active_sessions: Arc<AtomicU64>,
    frames_received: Arc<AtomicU64>,
    frames_rejected: Arc<AtomicU64>,
    broadcasts: Arc<AtomicU64>,
    deliveries: Arc<AtomicU64>,
    write_failures: Arc<AtomicU64>,
}

/// Point-in-time copy of [`RelayMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub active_sessions: u64,
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub write_failures: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_started(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_finished(&self) {
        // Saturate rather than wrap if a finish is ever recorded twice.
        let _ = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one fan-out that reached `delivered` peers and failed on `failed`.
    pub fn broadcast_sent(&self, delivered: usize, failed: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.write_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    pub fn export_to_json<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = RelayMetrics::new();
        let shared = metrics.clone();

        metrics.connection_accepted();
        metrics.connection_accepted();
        shared.session_started();
        shared.session_started();
        shared.session_finished();
        metrics.frame_received();
        metrics.frame_rejected();
        metrics.broadcast_sent(3, 1);
        metrics.broadcast_sent(2, 0);

        let snap = metrics.snapshot();
        assert_eq!(snap.connections_accepted, 2);
        assert_eq!(snap.active_sessions, 1);
        assert_eq!(snap.frames_received, 1);
        assert_eq!(snap.frames_rejected, 1);
        assert_eq!(snap.broadcasts, 2);
        assert_eq!(snap.deliveries, 5);
        assert_eq!(snap.write_failures, 1);
    }

    #[test]
    fn test_active_sessions_never_underflow() {
        let metrics = RelayMetrics::new();
        metrics.session_finished();
        assert_eq!(metrics.snapshot().active_sessions, 0);
    }

    #[test]
    fn test_export_to_json() {
        let metrics = RelayMetrics::new();
        metrics.broadcast_sent(4, 0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay_metrics.json");
        metrics.snapshot().export_to_json(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: MetricsSnapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, metrics.snapshot());
    }
}
