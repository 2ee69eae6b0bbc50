//! Namespace validation and content identifiers
//!
//! All records this subsystem writes into the shared DHT live under the
//! key prefix `/<namespace>/`, with the suffix being a canonical hex peer
//! identity. [`NamespaceValidator`] is plugged into the DHT substrate and
//! rejects anything else, so third parties cannot park arbitrary keys in
//! our namespace.
//!
//! Provider announcements use BLAKE3-derived content identifiers. Listing
//! and announcing both use the shared well-known [`peers_cid`]; each
//! registration additionally announces its own [`member_cid`] so a single
//! peer can be located by identity.

use crate::identity::PeerId;
use thiserror::Error;

/// Validation errors for DHT record keys
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidateError {
    /// Key does not carry this network's namespace prefix
    #[error("key {0:?} is outside the configured namespace")]
    WrongNamespace(String),

    /// Key suffix is not a valid peer identity
    #[error("key {0:?} has an invalid peer identity suffix")]
    InvalidIdentity(String),
}

/// Build the DHT record key for a registration identity
#[must_use]
pub fn record_key(namespace: &str, id: &str) -> String {
    format!("/{namespace}/{id}")
}

/// Content identifier for provider announcements (BLAKE3 of a namespace string)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cid([u8; 32]);

impl Cid {
    /// Derive a CID from an arbitrary namespace string
    #[must_use]
    pub fn from_str_ns(s: &str) -> Self {
        Self(*blake3::hash(s.as_bytes()).as_bytes())
    }

    /// Raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex rendering, for logs
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// The shared well-known CID all registered peers announce and search
///
/// Both sides of the provider protocol use this identifier, so a provider
/// search actually finds the peers that announced themselves.
#[must_use]
pub fn peers_cid(namespace: &str) -> Cid {
    Cid::from_str_ns(&format!("{namespace}:peers-node"))
}

/// Per-identity CID, announced alongside [`peers_cid`] for direct lookup
#[must_use]
pub fn member_cid(namespace: &str, id: &str) -> Cid {
    Cid::from_str_ns(&format!("{namespace}:{id}"))
}

/// Record validator plugged into the DHT substrate
///
/// `select` always picks the first candidate: records are written by a
/// single writer per key (the identity owner), so no cross-value conflict
/// resolution is attempted.
#[derive(Debug, Clone)]
pub struct NamespaceValidator {
    prefix: String,
}

impl NamespaceValidator {
    /// Create a validator for the given network namespace
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            prefix: format!("/{}/", namespace.into()),
        }
    }

    /// Validate a record key (the value is not inspected here; envelope
    /// verification happens at read time)
    ///
    /// # Errors
    ///
    /// Returns [`ValidateError::WrongNamespace`] if the key lacks the
    /// namespace prefix, or [`ValidateError::InvalidIdentity`] if the
    /// suffix does not decode as a peer identity.
    pub fn validate(&self, key: &str, _value: &[u8]) -> Result<(), ValidateError> {
        let suffix = key
            .strip_prefix(&self.prefix)
            .ok_or_else(|| ValidateError::WrongNamespace(key.to_string()))?;
        PeerId::from_hex(suffix)
            .map_err(|_| ValidateError::InvalidIdentity(key.to_string()))?;
        Ok(())
    }

    /// Choose among candidate values for a key: always the first
    #[must_use]
    pub fn select(&self, _key: &str, _values: &[Vec<u8>]) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    #[test]
    fn test_validate_accepts_namespaced_identity_key() {
        let validator = NamespaceValidator::new("roster");
        let id = Identity::generate().peer_id().to_hex();
        let key = record_key("roster", &id);
        assert!(validator.validate(&key, b"value").is_ok());
    }

    #[test]
    fn test_validate_rejects_foreign_namespace() {
        let validator = NamespaceValidator::new("roster");
        let id = Identity::generate().peer_id().to_hex();
        let key = record_key("other", &id);
        assert!(matches!(
            validator.validate(&key, b"value"),
            Err(ValidateError::WrongNamespace(_))
        ));
    }

    #[test]
    fn test_validate_rejects_malformed_identity() {
        let validator = NamespaceValidator::new("roster");
        for bad in ["/roster/", "/roster/zzzz", "/roster/abcd1234"] {
            assert!(matches!(
                validator.validate(bad, b""),
                Err(ValidateError::InvalidIdentity(_))
            ));
        }
    }

    #[test]
    fn test_validate_ignores_value() {
        // Empty values (tombstones) pass key validation
        let validator = NamespaceValidator::new("roster");
        let id = Identity::generate().peer_id().to_hex();
        let key = record_key("roster", &id);
        assert!(validator.validate(&key, b"").is_ok());
    }

    #[test]
    fn test_select_picks_first() {
        let validator = NamespaceValidator::new("roster");
        let values = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
        assert_eq!(validator.select("/roster/x", &values), 0);
    }

    #[test]
    fn test_peers_cid_is_stable_and_distinct() {
        assert_eq!(peers_cid("roster"), peers_cid("roster"));
        assert_ne!(peers_cid("roster"), peers_cid("other"));
        assert_ne!(peers_cid("roster"), member_cid("roster", "abc"));
    }

    #[test]
    fn test_member_cid_varies_by_identity() {
        assert_ne!(member_cid("roster", "a"), member_cid("roster", "b"));
        assert_eq!(member_cid("roster", "a"), member_cid("roster", "a"));
    }
}
