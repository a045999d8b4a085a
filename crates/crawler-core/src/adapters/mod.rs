//! # Adapters
//!
//! Concrete implementations of the driven ports.
//!
//! ## Adapters Provided
//!
//! - `SystemTimeSource` - wall clock
//! - `node_file` - JSON seed/output node list
//! - `TcpChannelFactory` - length-prefixed plaintext message channel
//! - `ProbeResolver` - TCP reachability as a record refresh
//! - `BootnodeDiscovery` - static bootnode list as a discovery source
//! - `MemoryStore`, `JsonLinesStore` - persistence collaborators

pub mod bootnodes;
pub mod node_file;
pub mod probe;
pub mod store;
pub mod tcp_channel;
pub mod time;

pub use bootnodes::BootnodeDiscovery;
pub use node_file::{read_node_file, read_node_file_or_default, write_node_file};
pub use probe::ProbeResolver;
pub use store::{JsonLinesStore, MemoryStore};
pub use tcp_channel::{TcpChannel, TcpChannelFactory, MAX_FRAME_SIZE};
pub use time::SystemTimeSource;
