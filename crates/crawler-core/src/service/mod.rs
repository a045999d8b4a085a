//! # Crawler Services
//!
//! - `handshake` - per-node protocol state machine collecting client info
//! - `round` - one bounded discovery and enrichment pass over the node set
//! - `supervisor` - back-to-back rounds, persistence and the node file

pub mod handshake;
pub mod round;
pub mod supervisor;

pub use handshake::{HandshakeClient, HandshakeConfig, HandshakeError, HandshakeStep};
pub use round::{RoundConfig, RoundEngine, RoundError, StaticNodeIterator};
pub use supervisor::{
    FlushBackoff, FlushOutcome, RoundSummary, Supervisor, SupervisorConfig, SupervisorError,
};
