//! # Client Components
//!
//! A terminal chat client for the relay. It is a protocol consumer only: it
//! sets a nickname, sends lines and prints the broadcasts it receives.

pub mod client;

pub use client::{ChatClient, ChatLine, ChatReceiver, ChatSender};
