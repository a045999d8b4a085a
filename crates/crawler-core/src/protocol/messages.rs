//! Message types and their RLP encoding.

use std::fmt;

use rlp::{DecoderError, Rlp, RlpStream};
use thiserror::Error;

use crate::domain::{Capability, PublicKey};

/// Base protocol version advertised in our hello
pub const BASE_PROTOCOL_VERSION: u64 = 5;

/// Peers at or above this base version compress frames with snappy
pub const SNAPPY_PROTOCOL_VERSION: u64 = 5;

/// Number of message codes reserved by the base protocol
pub const BASE_PROTOCOL_LENGTH: u64 = 16;

/// Message codes
pub mod codes {
    use super::BASE_PROTOCOL_LENGTH;

    /// Capability advertisement
    pub const HELLO: u64 = 0x00;
    /// Disconnect notification
    pub const DISCONNECT: u64 = 0x01;
    /// Keepalive request
    pub const PING: u64 = 0x02;
    /// Keepalive answer
    pub const PONG: u64 = 0x03;
    /// Chain status handshake
    pub const STATUS: u64 = BASE_PROTOCOL_LENGTH;
    /// Chain progress exchange
    pub const PROGRESS: u64 = BASE_PROTOCOL_LENGTH + 1;
}

/// Failure decoding a message payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Payload is not valid RLP for the message
    #[error("invalid rlp: {0}")]
    Rlp(#[from] DecoderError),
    /// A fixed-size field has the wrong length
    #[error("field {field} has {got} bytes, expected {expected}")]
    InvalidLength {
        /// Field name
        field: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        got: usize,
    },
}

/// Standard devp2p disconnect reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// 0x00
    Requested,
    /// 0x01
    NetworkError,
    /// 0x02
    ProtocolError,
    /// 0x03
    UselessPeer,
    /// 0x04
    TooManyPeers,
    /// 0x05
    AlreadyConnected,
    /// 0x06
    IncompatibleVersion,
    /// 0x07
    InvalidIdentity,
    /// 0x08
    ClientQuitting,
    /// 0x09
    UnexpectedIdentity,
    /// 0x0a
    ConnectedToSelf,
    /// 0x0b
    ReadTimeout,
    /// 0x10
    SubprotocolError,
    /// Any code without a standard meaning
    Unknown(u8),
}

impl DisconnectReason {
    /// Wire code
    pub fn code(&self) -> u8 {
        match self {
            DisconnectReason::Requested => 0x00,
            DisconnectReason::NetworkError => 0x01,
            DisconnectReason::ProtocolError => 0x02,
            DisconnectReason::UselessPeer => 0x03,
            DisconnectReason::TooManyPeers => 0x04,
            DisconnectReason::AlreadyConnected => 0x05,
            DisconnectReason::IncompatibleVersion => 0x06,
            DisconnectReason::InvalidIdentity => 0x07,
            DisconnectReason::ClientQuitting => 0x08,
            DisconnectReason::UnexpectedIdentity => 0x09,
            DisconnectReason::ConnectedToSelf => 0x0a,
            DisconnectReason::ReadTimeout => 0x0b,
            DisconnectReason::SubprotocolError => 0x10,
            DisconnectReason::Unknown(code) => *code,
        }
    }

    /// Map a wire code
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => DisconnectReason::Requested,
            0x01 => DisconnectReason::NetworkError,
            0x02 => DisconnectReason::ProtocolError,
            0x03 => DisconnectReason::UselessPeer,
            0x04 => DisconnectReason::TooManyPeers,
            0x05 => DisconnectReason::AlreadyConnected,
            0x06 => DisconnectReason::IncompatibleVersion,
            0x07 => DisconnectReason::InvalidIdentity,
            0x08 => DisconnectReason::ClientQuitting,
            0x09 => DisconnectReason::UnexpectedIdentity,
            0x0a => DisconnectReason::ConnectedToSelf,
            0x0b => DisconnectReason::ReadTimeout,
            0x10 => DisconnectReason::SubprotocolError,
            other => DisconnectReason::Unknown(other),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(1);
        s.append(&self.code());
        s.out().to_vec()
    }

    /// Peers send either `[reason]` or a bare `reason`; an empty payload
    /// means no reason was given.
    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.is_empty() {
            return Ok(DisconnectReason::Requested);
        }
        let rlp = Rlp::new(payload);
        let code: u8 = if rlp.is_list() {
            if rlp.item_count()? == 0 {
                return Ok(DisconnectReason::Requested);
            }
            rlp.val_at(0)?
        } else {
            rlp.as_val()?
        };
        Ok(Self::from_code(code))
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DisconnectReason::Requested => "disconnect requested",
            DisconnectReason::NetworkError => "network error",
            DisconnectReason::ProtocolError => "breach of protocol",
            DisconnectReason::UselessPeer => "useless peer",
            DisconnectReason::TooManyPeers => "too many peers",
            DisconnectReason::AlreadyConnected => "already connected",
            DisconnectReason::IncompatibleVersion => "incompatible p2p protocol version",
            DisconnectReason::InvalidIdentity => "invalid node identity",
            DisconnectReason::ClientQuitting => "client quitting",
            DisconnectReason::UnexpectedIdentity => "unexpected identity",
            DisconnectReason::ConnectedToSelf => "connected to self",
            DisconnectReason::ReadTimeout => "read timeout",
            DisconnectReason::SubprotocolError => "subprotocol error",
            DisconnectReason::Unknown(code) => {
                return write!(f, "unknown disconnect reason {}", code);
            }
        };
        f.write_str(text)
    }
}

/// Capability advertisement: `[version, name, [[cap, ver]..], port, id, ..]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Base protocol version
    pub version: u64,
    /// Client identification string
    pub name: String,
    /// Supported application protocols
    pub capabilities: Vec<Capability>,
    /// Listening port (0 if not listening)
    pub listen_port: u64,
    /// Public key without the type-tag byte
    pub id: PublicKey,
}

impl Hello {
    fn encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(5);
        s.append(&self.version);
        s.append(&self.name);
        s.begin_list(self.capabilities.len());
        for cap in &self.capabilities {
            s.begin_list(2);
            s.append(&cap.name);
            s.append(&cap.version);
        }
        s.append(&self.listen_port);
        s.append(&self.id.as_bytes().to_vec());
        s.out().to_vec()
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let rlp = Rlp::new(payload);
        if rlp.item_count()? < 5 {
            return Err(DecoderError::RlpIncorrectListLen.into());
        }

        let mut capabilities = Vec::new();
        for cap in rlp.at(2)?.iter() {
            capabilities.push(Capability::new(
                cap.val_at::<String>(0)?,
                cap.val_at::<u32>(1)?,
            ));
        }

        let id_bytes: Vec<u8> = rlp.val_at(4)?;
        let id: [u8; 64] = fixed("id", id_bytes)?;

        Ok(Self {
            version: rlp.val_at(0)?,
            name: rlp.val_at(1)?,
            capabilities,
            listen_port: rlp.val_at(3)?,
            id: PublicKey::new(id),
        })
    }
}

/// Chain status handshake: `[protocol_version, network_id, genesis, ..]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Negotiated application protocol version
    pub protocol_version: u32,
    /// Network identifier
    pub network_id: u64,
    /// Genesis hash
    pub genesis: [u8; 32],
}

impl Status {
    fn encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(3);
        s.append(&self.protocol_version);
        s.append(&self.network_id);
        s.append(&self.genesis.to_vec());
        s.out().to_vec()
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let rlp = Rlp::new(payload);
        if rlp.item_count()? < 3 {
            return Err(DecoderError::RlpIncorrectListLen.into());
        }
        Ok(Self {
            protocol_version: rlp.val_at(0)?,
            network_id: rlp.val_at(1)?,
            genesis: fixed("genesis", rlp.val_at(2)?)?,
        })
    }
}

/// Chain progress: `[epoch, last_block, checkpoint, ..]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Current epoch
    pub epoch: u32,
    /// Index of the last block
    pub last_block: u64,
    /// Checkpoint event hash of the last block
    pub checkpoint: [u8; 32],
}

impl Progress {
    fn encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(3);
        s.append(&self.epoch);
        s.append(&self.last_block);
        s.append(&self.checkpoint.to_vec());
        s.out().to_vec()
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let rlp = Rlp::new(payload);
        if rlp.item_count()? < 3 {
            return Err(DecoderError::RlpIncorrectListLen.into());
        }
        Ok(Self {
            epoch: rlp.val_at(0)?,
            last_block: rlp.val_at(1)?,
            checkpoint: fixed("checkpoint", rlp.val_at(2)?)?,
        })
    }
}

fn fixed<const N: usize>(field: &'static str, bytes: Vec<u8>) -> Result<[u8; N], ProtocolError> {
    let got = bytes.len();
    bytes.try_into().map_err(|_| ProtocolError::InvalidLength {
        field,
        expected: N,
        got,
    })
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Capability advertisement
    Hello(Hello),
    /// Disconnect with reason
    Disconnect(DisconnectReason),
    /// Keepalive request
    Ping,
    /// Keepalive answer
    Pong,
    /// Chain status handshake
    Status(Status),
    /// Chain progress exchange
    Progress(Progress),
    /// Any message the crawler does not interpret
    Other {
        /// Message code
        code: u64,
    },
}

impl Message {
    /// Wire code of the message
    pub fn code(&self) -> u64 {
        match self {
            Message::Hello(_) => codes::HELLO,
            Message::Disconnect(_) => codes::DISCONNECT,
            Message::Ping => codes::PING,
            Message::Pong => codes::PONG,
            Message::Status(_) => codes::STATUS,
            Message::Progress(_) => codes::PROGRESS,
            Message::Other { code } => *code,
        }
    }

    /// Encode the payload; the code travels separately in the frame.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Hello(hello) => hello.encode(),
            Message::Disconnect(reason) => reason.encode(),
            Message::Ping | Message::Pong => RlpStream::new_list(0).out().to_vec(),
            Message::Status(status) => status.encode(),
            Message::Progress(progress) => progress.encode(),
            Message::Other { .. } => Vec::new(),
        }
    }

    /// Decode a payload received with `code`.
    pub fn decode(code: u64, payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(match code {
            codes::HELLO => Message::Hello(Hello::decode(payload)?),
            codes::DISCONNECT => Message::Disconnect(DisconnectReason::decode(payload)?),
            codes::PING => Message::Ping,
            codes::PONG => Message::Pong,
            codes::STATUS => Message::Status(Status::decode(payload)?),
            codes::PROGRESS => Message::Progress(Progress::decode(payload)?),
            code => Message::Other { code },
        })
    }
}
