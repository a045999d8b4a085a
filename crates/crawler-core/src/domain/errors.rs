//! Domain Errors for the Crawler

use thiserror::Error;

/// Errors parsing node identities and enode URLs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordParseError {
    /// Input is not valid hex
    #[error("invalid hex encoding")]
    InvalidHex,
    /// Decoded bytes have the wrong length
    #[error("invalid length, expected {expected} bytes")]
    InvalidLength {
        /// Expected byte length
        expected: usize,
    },
    /// The `@host:port` part is missing
    #[error("missing host part")]
    MissingHost,
    /// Host or port cannot be parsed
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Errors from the address-record refresh primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Peer did not answer in time
    #[error("record request timed out")]
    Timeout,
    /// Peer answered but does not serve its record
    #[error("record request not supported by peer")]
    Unsupported,
    /// Peer could not be reached
    #[error("peer unreachable: {0}")]
    Unreachable(String),
}

/// Errors from the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying storage I/O failed
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A row could not be serialized
    #[error("row serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Backend rejected the transaction
    #[error("transaction failed: {0}")]
    Transaction(String),
}

/// Errors reading or writing the seed/output node file.
#[derive(Debug, Error)]
pub enum NodeFileError {
    /// File could not be read or written
    #[error("node file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// File content is not valid JSON
    #[error("node file is malformed: {0}")]
    Json(#[from] serde_json::Error),
    /// An entry carries an invalid record
    #[error("invalid entry {key}: {source}")]
    InvalidEntry {
        /// Key of the offending entry
        key: String,
        /// Parse failure
        #[source]
        source: RecordParseError,
    },
}
