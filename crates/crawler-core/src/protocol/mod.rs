//! # Wire Protocol
//!
//! devp2p base messages (hello, disconnect, ping, pong) and the two
//! chain-specific handshake messages (status, progress), RLP encoded.
//!
//! Application message codes are offset by [`BASE_PROTOCOL_LENGTH`], the
//! number of codes reserved for the base protocol.

mod messages;
mod negotiation;
mod session;

pub use messages::{
    codes, DisconnectReason, Hello, Message, Progress, ProtocolError, Status,
    BASE_PROTOCOL_LENGTH, BASE_PROTOCOL_VERSION, SNAPPY_PROTOCOL_VERSION,
};
pub use negotiation::negotiate;
pub use session::{SessionKey, SessionKeyError};
