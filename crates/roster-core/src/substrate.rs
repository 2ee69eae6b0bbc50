//! Substrate seams
//!
//! The encrypted transport and the Kademlia-style DHT are external
//! collaborators. The registry consumes them through these traits so the
//! whole subsystem can run against in-process fakes in tests.

use crate::config::RunMode;
use crate::identity::PeerId;
use crate::namespace::{Cid, NamespaceValidator};
use crate::types::NodeAddr;
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the transport/DHT substrate
#[derive(Debug, Error, Clone)]
pub enum SubstrateError {
    /// Operation timed out
    #[error("substrate operation timed out: {0}")]
    Timeout(String),

    /// Peer or address unreachable
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Protocol-level failure
    #[error("substrate protocol error: {0}")]
    Protocol(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl SubstrateError {
    /// Whether the failure may succeed on a later tick
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SubstrateError::Timeout(_) | SubstrateError::Unreachable(_)
        )
    }
}

/// Kademlia-style DHT operations consumed by the registry
#[async_trait]
pub trait Dht: Send + Sync {
    /// Set how this node participates in the overlay (server, client, or
    /// reachability-based)
    fn set_run_mode(&self, mode: RunMode);

    /// Install the namespace validator used to gate writes into our keyspace
    fn install_validator(&self, validator: NamespaceValidator);

    /// Store a value under a namespaced key
    async fn put_value(&self, key: &str, value: Vec<u8>) -> Result<(), SubstrateError>;

    /// Fetch a value; `None` means no record exists
    async fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>, SubstrateError>;

    /// Announce this node as a provider for a content identifier
    async fn provide(&self, cid: Cid) -> Result<(), SubstrateError>;

    /// Find peers providing a content identifier
    async fn find_providers(
        &self,
        cid: Cid,
        limit: usize,
    ) -> Result<Vec<PeerId>, SubstrateError>;

    /// Join the overlay via the given candidate peers
    async fn bootstrap(&self, candidates: &[NodeAddr]) -> Result<(), SubstrateError>;

    /// Trigger a routing table refresh
    async fn refresh_routing_table(&self) -> Result<(), SubstrateError>;

    /// Current routing table size (0 means the DHT has no peers yet)
    fn routing_table_size(&self) -> usize;

    /// The substrate's compiled-in default bootstrap peers
    fn default_bootstrap_peers(&self) -> Vec<NodeAddr>;
}

/// Transport host operations consumed by the registry and local discovery
#[async_trait]
pub trait Host: Send + Sync {
    /// This host's identity
    fn local_id(&self) -> PeerId;

    /// Addresses this host is listening on
    fn listen_addrs(&self) -> Vec<String>;

    /// Dial a peer at an address
    async fn connect(&self, addr: &NodeAddr) -> Result<(), SubstrateError>;

    /// Whether a live connection to the peer exists
    fn is_connected(&self, peer: &PeerId) -> bool;

    /// Peers with live connections
    fn connected_peers(&self) -> Vec<PeerId>;

    /// Known addresses for a peer from the peerstore
    fn peer_addrs(&self, peer: &PeerId) -> Vec<String>;
}

/// Connect/disconnect notification from the transport
///
/// Delivered over a channel rather than a registered callback, so the
/// consumer controls ordering and there is no re-entrancy into the
/// transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnEvent {
    /// A connection to `peer` was established at `addr`
    Connected {
        /// Remote peer
        peer: PeerId,
        /// Remote address
        addr: String,
    },
    /// The connection to `peer` went away
    Disconnected {
        /// Remote peer
        peer: PeerId,
    },
}
