//! Peer identities and node keypairs
//!
//! A peer identity is the 32-byte Ed25519 public key of the node, carried
//! around as [`PeerId`] and rendered as lowercase hex wherever the identity
//! crosses a text boundary (DHT keys, registration IDs, persisted rows).
//!
//! [`Identity`] holds the signing half. It is loaded from a seed file at
//! startup so a node keeps the same identity across restarts; a missing
//! file is populated with a freshly generated seed.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use thiserror::Error;

/// Identity errors
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Key file could not be read or written
    #[error("key file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key file contents are not a valid hex-encoded seed
    #[error("invalid key file: {0}")]
    InvalidKeyFile(String),

    /// Identity string does not decode to a 32-byte key
    #[error("invalid peer identity: {0}")]
    InvalidPeerId(String),

    /// Signature verification failed
    #[error("signature verification failed")]
    BadSignature,
}

/// A peer identity: the node's Ed25519 public key
///
/// The canonical text form is 64 lowercase hex characters. This is the
/// identity codec used in DHT record keys and registration IDs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Create a peer ID from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render as the canonical hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from the canonical hex string
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidPeerId`] if the input is not exactly
    /// 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(s).map_err(|_| IdentityError::InvalidPeerId(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidPeerId(s.to_string()))?;
        Ok(Self(arr))
    }

    /// Verify a signature made by this identity
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::BadSignature`] if the key or signature is
    /// malformed or the signature does not cover `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), IdentityError> {
        let key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| IdentityError::BadSignature)?;
        let sig = Signature::from_slice(signature).map_err(|_| IdentityError::BadSignature)?;
        key.verify(message, &sig)
            .map_err(|_| IdentityError::BadSignature)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerId({}..)", hex::encode(&self.0[..8]))
    }
}

impl Serialize for PeerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PeerId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Node identity: an Ed25519 keypair
///
/// The peer ID is the verifying key; the signing key is used to seal
/// records published into the DHT.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a fresh random identity
    #[must_use]
    pub fn generate() -> Self {
        use rand_core::OsRng;
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restore an identity from a 32-byte seed
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Load the identity from a hex seed file, creating it when absent
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but does not hold a valid
    /// hex-encoded 32-byte seed, or on I/O failure.
    pub fn load_or_generate(path: &Path) -> Result<Self, IdentityError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let bytes = hex::decode(contents.trim())
                .map_err(|e| IdentityError::InvalidKeyFile(e.to_string()))?;
            let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
                IdentityError::InvalidKeyFile(format!("seed is {} bytes, expected 32", b.len()))
            })?;
            Ok(Self::from_seed(seed))
        } else {
            let identity = Self::generate();
            std::fs::write(path, hex::encode(identity.signing_key.to_bytes()))?;
            Ok(identity)
        }
    }

    /// This identity's peer ID
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        PeerId(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message, returning the 64-byte signature
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("peer_id", &self.peer_id())
            .finish()
    }
}
