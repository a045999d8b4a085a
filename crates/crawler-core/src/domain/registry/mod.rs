//! # Node Registry
//!
//! Keyed store of per-node liveness records with two scoring tracks:
//! cheap address-record refreshes gate the expensive handshake refresh.
//!
//! The registry itself is single-threaded; the round engine wraps it in one
//! mutex and only holds the lock for a read-modify-write, never across I/O.

mod config;
mod manager;
mod policy;

pub use config::RegistryConfig;
pub use manager::NodeRegistry;
pub use policy::{CheckOutcome, HandshakeUpdate};
