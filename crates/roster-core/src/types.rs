//! Registration and peer record types
//!
//! [`Registration`] is the public request/response record callers hand to
//! the registry; [`PeerRecord`] is the reduced payload that actually gets
//! sealed and written into the DHT. [`NodeAddr`] is a transport address
//! carrying its peer-id suffix, the unit of the bootstrap candidate set.

use crate::identity::{IdentityError, PeerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Metadata key for the transport host identity injected at register time
pub const META_HOST: &str = "host";
/// Metadata key for the record signature (hex)
pub const META_SIGNATURE: &str = "signature";
/// Metadata key for the signing timestamp (unix seconds, decimal string)
pub const META_TIMESTAMP: &str = "timestamp";
/// Metadata key tagging where a queried peer was sourced from
pub const META_REGISTER_TYPE: &str = "registerType";

/// What kind of participant a registration describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    /// A component running inside a node
    Component,
    /// A full node
    Node,
}

/// Public registration record
///
/// Created by the caller before `register`; the registry never mutates it
/// after acceptance except to inject identity fields into `metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    /// Unique identity string (canonical hex peer ID), required
    pub id: String,
    /// Display name, required
    pub name: String,
    /// Participant kind
    pub kind: RegisterKind,
    /// Namespace tags
    pub namespaces: Vec<String>,
    /// Network address strings
    pub addresses: Vec<String>,
    /// Open string-keyed metadata
    pub metadata: HashMap<String, String>,
    /// Requested record lifetime
    pub ttl: Option<Duration>,
}

impl Registration {
    /// Create a registration with the required fields set
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: RegisterKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            namespaces: Vec::new(),
            addresses: Vec::new(),
            metadata: HashMap::new(),
            ttl: None,
        }
    }
}

/// Internal DHT payload for one peer
///
/// This is what gets sealed in a [`crate::SignedEnvelope`] and stored under
/// the namespaced record key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Peer identity string
    pub id: String,
    /// Display name
    pub name: String,
    /// Node software version
    pub version: String,
    /// Metadata map; sealing merges `signature` and `timestamp` into it
    pub metadata: HashMap<String, String>,
}

/// Error parsing a [`NodeAddr`] from its text form
#[derive(Debug, Error)]
pub enum AddrParseError {
    /// Missing the `/p2p/<peer-id>` suffix
    #[error("address {0:?} has no /p2p/ peer suffix")]
    MissingPeerSuffix(String),

    /// Peer suffix is not a valid identity
    #[error(transparent)]
    InvalidPeer(#[from] IdentityError),
}

/// A transport address with its peer-id suffix
///
/// Text form is `<addr>/p2p/<hex-peer-id>`. Equality (and bootstrap
/// de-duplication) is by the full text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    /// Transport address string
    pub addr: String,
    /// Peer identity at that address
    pub peer: PeerId,
}

impl NodeAddr {
    /// Create a node address
    #[must_use]
    pub fn new(addr: impl Into<String>, peer: PeerId) -> Self {
        Self {
            addr: addr.into(),
            peer,
        }
    }
}

impl std::fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/p2p/{}", self.addr, self.peer)
    }
}

impl FromStr for NodeAddr {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, peer) = s
            .rsplit_once("/p2p/")
            .ok_or_else(|| AddrParseError::MissingPeerSuffix(s.to_string()))?;
        Ok(Self {
            addr: addr.to_string(),
            peer: PeerId::from_hex(peer)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    #[test]
    fn test_registration_new() {
        let reg = Registration::new("abc", "my-node", RegisterKind::Node);
        assert_eq!(reg.id, "abc");
        assert_eq!(reg.name, "my-node");
        assert!(reg.addresses.is_empty());
        assert!(reg.metadata.is_empty());
    }

    #[test]
    fn test_register_kind_serde() {
        let json = serde_json::to_string(&RegisterKind::Component).unwrap();
        assert_eq!(json, "\"component\"");
        let kind: RegisterKind = serde_json::from_str("\"node\"").unwrap();
        assert_eq!(kind, RegisterKind::Node);
    }

    #[test]
    fn test_node_addr_round_trip() {
        let peer = Identity::generate().peer_id();
        let addr = NodeAddr::new("/ip4/10.0.0.1/tcp/4001", peer);
        let parsed: NodeAddr = addr.to_string().parse().unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn test_node_addr_rejects_missing_suffix() {
        let result: Result<NodeAddr, _> = "/ip4/10.0.0.1/tcp/4001".parse();
        assert!(matches!(result, Err(AddrParseError::MissingPeerSuffix(_))));
    }

    #[test]
    fn test_node_addr_rejects_bad_peer() {
        let result: Result<NodeAddr, _> = "/ip4/10.0.0.1/tcp/4001/p2p/nothex".parse();
        assert!(matches!(result, Err(AddrParseError::InvalidPeer(_))));
    }
}
