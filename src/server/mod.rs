//! # Relay Server
//!
//! - [`roster`]: the shared, lock-guarded set of connected sessions
//! - [`session`]: per-connection receive loop
//! - [`listener`]: accept loop spawning one session task per connection
//! - [`server`]: shared context, startup and shutdown
//! - [`console`]: administrative commands over stdin
//! - [`config`] / [`metrics`]: settings and counters

pub mod config;
pub mod console;
pub mod listener;
pub mod metrics;
pub mod roster;
pub mod server;
pub mod session;

pub use config::RelayConfig;
pub use metrics::RelayMetrics;
pub use roster::{Roster, SessionHandle};
pub use server::{start_relay, RelayContext, RelayHandle};
