//! # Common Components
//!
//! Shared pieces used by both the relay and the chat client.
//!
//! ## Modules
//!
//! - [`messages`]: Binary frame definitions and the bounds-checked codec
//! - [`connection`]: Client-side TCP connection speaking the frame protocol
//! - [`config`]: Configuration file loading

pub mod messages;
pub mod connection;
pub mod config;
