//! # Handshake Client
//!
//! Per-node protocol state machine: dial, hello and capability negotiation,
//! chain status check, progress exchange, and a graceful disconnect.
//! Every step runs under its own deadline.

mod client;
mod config;
mod error;

pub use client::HandshakeClient;
pub use config::HandshakeConfig;
pub use error::{HandshakeError, HandshakeStep};

#[cfg(test)]
mod tests;
