//! Domain Layer - Pure crawler logic with no I/O
//!
//! This module contains:
//! - Node identifiers, timestamps and signed address records
//! - Per-node observation records and the round's node set
//! - The node registry with its scoring and eviction policy
//! - The client identification string parser
//! - Chain identity checked during the status handshake

pub mod chain;
pub mod crawled;
pub mod entities;
pub mod errors;
pub mod node;
pub mod registry;
pub mod version;

pub use chain::*;
pub use crawled::*;
pub use entities::*;
pub use errors::*;
pub use node::*;
pub use registry::*;
pub use version::*;
