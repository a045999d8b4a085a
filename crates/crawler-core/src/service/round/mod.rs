//! # Discovery Round Engine
//!
//! One bounded pass of discovery and enrichment. Discovery iterators feed a
//! bounded intake queue; a single coordinator applies the liveness policy
//! and queues handshake refreshes for a fixed worker pool.
//!
//! The round deadline is armed only once the iterator replaying the input
//! set is drained, so every known node is probed before time-boxing starts.

mod config;
mod engine;
mod seed;

pub use config::RoundConfig;
pub use engine::{RoundEngine, RoundError};
pub use seed::StaticNodeIterator;

#[cfg(test)]
mod tests;
