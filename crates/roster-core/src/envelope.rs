//! Signed record envelopes
//!
//! Records published into the shared DHT are wrapped in a signed envelope
//! so readers can check that the record was produced by the identity it
//! claims to describe. The signature covers the reduced tuple
//! `(name, version, timestamp)`; sealing merges the signature and
//! timestamp into the record's metadata, preserving any caller-supplied
//! entries already present.

use crate::identity::{Identity, PeerId};
use crate::types::{PeerRecord, META_SIGNATURE, META_TIMESTAMP};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Envelope errors
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Serialization failed
    #[error("envelope encode failed: {0}")]
    Encode(String),

    /// Deserialization failed (malformed DHT value)
    #[error("envelope decode failed: {0}")]
    Decode(String),

    /// Record carries no signing timestamp
    #[error("record has no signing timestamp")]
    MissingTimestamp,

    /// Signature does not verify against the embedded public key
    #[error("record signature is invalid")]
    BadSignature,
}

/// A sealed DHT record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Bincode-serialized [`PeerRecord`] with signature metadata merged in
    pub payload: Vec<u8>,
    /// Signer's Ed25519 public key
    pub public_key: [u8; 32],
    /// Signature over the `(name, version, timestamp)` tuple
    pub signature: Vec<u8>,
}

impl SignedEnvelope {
    /// Seal a peer record for DHT publication
    ///
    /// Signs the `(name, version, timestamp)` tuple and merges
    /// `signature`/`timestamp` into the record's metadata before
    /// serializing it as the payload.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encode`] if serialization fails.
    pub fn seal(identity: &Identity, record: &PeerRecord) -> Result<Self, EnvelopeError> {
        let timestamp = unix_now().to_string();
        let tuple = (
            record.name.clone(),
            record.version.clone(),
            timestamp.clone(),
        );
        let message =
            bincode::serialize(&tuple).map_err(|e| EnvelopeError::Encode(e.to_string()))?;
        let signature = identity.sign(&message);

        let mut sealed = record.clone();
        sealed
            .metadata
            .insert(META_SIGNATURE.to_string(), hex::encode(&signature));
        sealed.metadata.insert(META_TIMESTAMP.to_string(), timestamp);

        let payload =
            bincode::serialize(&sealed).map_err(|e| EnvelopeError::Encode(e.to_string()))?;

        Ok(Self {
            payload,
            public_key: *identity.peer_id().as_bytes(),
            signature,
        })
    }

    /// Serialize the envelope for `put_value`
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encode`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        bincode::serialize(self).map_err(|e| EnvelopeError::Encode(e.to_string()))
    }

    /// Deserialize and verify an envelope fetched from the DHT
    ///
    /// # Errors
    ///
    /// Returns a decode error for malformed bytes, [`EnvelopeError::MissingTimestamp`]
    /// if the record lacks its signing timestamp, or [`EnvelopeError::BadSignature`]
    /// if verification fails.
    pub fn open(bytes: &[u8]) -> Result<PeerRecord, EnvelopeError> {
        let envelope: SignedEnvelope =
            bincode::deserialize(bytes).map_err(|e| EnvelopeError::Decode(e.to_string()))?;
        let record: PeerRecord = bincode::deserialize(&envelope.payload)
            .map_err(|e| EnvelopeError::Decode(e.to_string()))?;

        let timestamp = record
            .metadata
            .get(META_TIMESTAMP)
            .ok_or(EnvelopeError::MissingTimestamp)?;
        let tuple = (
            record.name.clone(),
            record.version.clone(),
            timestamp.clone(),
        );
        let message =
            bincode::serialize(&tuple).map_err(|e| EnvelopeError::Encode(e.to_string()))?;

        PeerId::from_bytes(envelope.public_key)
            .verify(&message, &envelope.signature)
            .map_err(|_| EnvelopeError::BadSignature)?;

        Ok(record)
    }

    /// The signer's peer ID
    #[must_use]
    pub fn signer(&self) -> PeerId {
        PeerId::from_bytes(self.public_key)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
