//! Per-dial identity keys.

use secp256k1::{Secp256k1, SecretKey};
use thiserror::Error;

use crate::domain::PublicKey;

/// Invalid configured secret key
#[derive(Debug, Error)]
pub enum SessionKeyError {
    /// Not hex encoded
    #[error("node key is not valid hex")]
    InvalidHex,
    /// Not a valid secp256k1 scalar
    #[error("node key is not a valid secp256k1 secret key: {0}")]
    InvalidKey(#[from] secp256k1::Error),
}

/// secp256k1 identity presented in the hello message.
///
/// The handshake client generates a fresh one for every dial.
#[derive(Clone)]
pub struct SessionKey {
    secret: SecretKey,
}

impl SessionKey {
    /// Generate a random key.
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::new(&mut rand::thread_rng()),
        }
    }

    /// Parse a hex encoded 32-byte secret key.
    pub fn from_hex(s: &str) -> Result<Self, SessionKeyError> {
        let bytes = hex::decode(s.trim().trim_start_matches("0x"))
            .map_err(|_| SessionKeyError::InvalidHex)?;
        Ok(Self {
            secret: SecretKey::from_slice(&bytes)?,
        })
    }

    /// Uncompressed public key without the leading `0x04` tag byte.
    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::signing_only();
        let uncompressed = self.secret.public_key(&secp).serialize_uncompressed();
        let mut key = [0u8; 64];
        key.copy_from_slice(&uncompressed[1..]);
        PublicKey::new(key)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}
