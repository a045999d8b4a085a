//! # Crawler Supervisor
//!
//! Runs discovery rounds back to back, hands every round's snapshot to the
//! persistence collaborator and rewrites the node file.
//!
//! Storage failures never stop the crawl: a failed flush is kept pending and
//! retried between rounds under an exponential backoff.

mod backoff;
mod config;
mod runner;

pub use backoff::FlushBackoff;
pub use config::SupervisorConfig;
pub use runner::{FlushOutcome, RoundSummary, Supervisor, SupervisorError};
