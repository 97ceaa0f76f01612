//! # Relay Server - Context and Lifecycle
//!
//! [`RelayContext`] is the explicitly owned state every task of the relay
//! shares: the roster, the metrics, the session settings and the shutdown
//! signal. It is cloned into the listener and into every session; nothing
//! lives in statics.
//!
//! [`start_relay`] binds the listener, spawns the accept loop and hands back
//! a [`RelayHandle`] for inspection and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::server::config::{RelayConfig, SessionConfig};
use crate::server::listener::Listener;
use crate::server::metrics::RelayMetrics;
use crate::server::roster::Roster;

/// State shared by the listener and every session.
#[derive(Clone)]
pub struct RelayContext {
    pub roster: Arc<Roster>,
    pub metrics: RelayMetrics,
    pub session: SessionConfig,
    shutdown: watch::Receiver<bool>,
}

impl RelayContext {
    /// Build a context plus the sender that stops everything holding a clone of it.
    pub fn new(
        roster: Arc<Roster>,
        metrics: RelayMetrics,
        session: SessionConfig,
    ) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            roster,
            metrics,
            session,
            shutdown: rx,
        };
        (ctx, tx)
    }

    /// Resolves once shutdown is signalled, or once the sender is gone.
    pub async fn shutdown_requested(&mut self) {
        loop {
            if *self.shutdown.borrow_and_update() {
                return;
            }
            if self.shutdown.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Handle to a running relay.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) also
/// stops the accept loop and the sessions, but leaves the roster entries to
/// be cleaned up by the session loops themselves.
pub struct RelayHandle {
    local_addr: SocketAddr,
    ctx: RelayContext,
    shutdown_tx: watch::Sender<bool>,
    listener_task: JoinHandle<()>,
}

impl RelayHandle {
    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.ctx.roster
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.ctx.metrics
    }

    /// Stop accepting, stop every session loop and force-close all members.
    /// In-flight broadcasts are not drained. Returns how many members were closed.
    pub async fn shutdown(self) -> usize {
        info!("🛑 Shutting down relay on {}", self.local_addr);
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.listener_task.await {
            error!("❌ Listener task failed: {}", e);
        }

        self.ctx.roster.close_all().await
    }
}

/// Bind the configured address and start accepting connections.
///
/// # Returns
/// - `Ok(RelayHandle)`: the relay is accepting connections
/// - `Err`: the address is invalid or could not be bound
///
/// # Example
/// ```ignore
/// let handle = start_relay(&RelayConfig::default()).await?;
/// println!("listening on {}", handle.local_addr());
/// ```
pub async fn start_relay(config: &RelayConfig) -> Result<RelayHandle> {
    let addr = config.listen_addr()?;

    let metrics = RelayMetrics::new();
    let roster = Arc::new(Roster::new(metrics.clone()));
    let (ctx, shutdown_tx) = RelayContext::new(roster, metrics, config.session.clone());

    let listener = Listener::bind(addr, ctx.clone()).await?;
    let local_addr = listener.local_addr()?;
    let listener_task = tokio::spawn(listener.run());

    Ok(RelayHandle {
        local_addr,
        ctx,
        shutdown_tx,
        listener_task,
    })
}
