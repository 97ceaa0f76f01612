pub mod client;
pub mod common;
pub mod server;

pub use common::messages::Frame;
pub use server::{start_relay, RelayConfig, RelayHandle};
