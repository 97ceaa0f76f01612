//! # Listener - Accept Loop
//!
//! Accepts TCP connections and starts one [`Session`] task per connection.
//! The loop never waits for a session to finish and places no limit on how
//! many run at once.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use log::{debug, error, info};
use tokio::net::TcpListener;

use crate::server::server::RelayContext;
use crate::server::session::Session;

pub struct Listener {
    listener: TcpListener,
    ctx: RelayContext,
}

impl Listener {
    /// Bind `addr`. Failure here is fatal for the relay.
    pub async fn bind(addr: SocketAddr, ctx: RelayContext) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown is signalled.
    pub async fn run(self) {
        let Listener { listener, mut ctx } = self;

        if let Ok(addr) = listener.local_addr() {
            info!("📡 Relay listening on {}", addr);
        }

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = ctx.shutdown_requested() => break,
            };

            match accepted {
                Ok((socket, addr)) => {
                    debug!("🔗 Accepted connection from {}", addr);
                    ctx.metrics.connection_accepted();

                    let (reader, writer) = socket.into_split();
                    let session = Session::new(reader, Box::new(writer), addr, ctx.clone());
                    tokio::spawn(session.run());
                }
                // Transient (e.g. out of file descriptors); keep serving.
                Err(e) => error!("❌ Accept error: {}", e),
            }
        }

        info!("📴 Listener stopped");
    }
}
