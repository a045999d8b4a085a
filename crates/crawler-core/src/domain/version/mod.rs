//! # Client Version Parser
//!
//! Turns free-form client identification strings such as
//! `go-opera/v1.1.2-rc.6-825a85c9-1689192286/linux-amd64/go1.20.4`
//! into structured name, version, OS and runtime fields.
//!
//! The parser is heuristic. Low-confidence inputs are flagged as
//! unparseable instead of being guessed at.

mod parser;
mod types;

pub use parser::parse_version_string;
pub use types::{OsInfo, ParsedVersion, RuntimeInfo, Version};
