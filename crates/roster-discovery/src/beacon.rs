//! Beacon seam for the multicast discovery primitive
//!
//! The actual multicast transport (mDNS-style announce/listen) belongs to
//! the substrate. [`LocalDiscovery`](crate::LocalDiscovery) drives it
//! through this trait and receives found peers via
//! [`handle_peer_found`](crate::LocalDiscovery::handle_peer_found).

use crate::service::DiscoveryError;
use async_trait::async_trait;
use roster_core::PeerId;
use serde::{Deserialize, Serialize};

/// This node's discovery record, as advertised on the local segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvertisedNode {
    /// Our peer identity
    pub peer: PeerId,
    /// Display name
    pub name: String,
    /// Addresses we are reachable at
    pub addresses: Vec<String>,
}

/// Multicast discovery primitive
#[async_trait]
pub trait Beacon: Send + Sync {
    /// Start announcing/listening on the local segment
    async fn start(&self) -> Result<(), DiscoveryError>;

    /// Stop the primitive
    async fn stop(&self) -> Result<(), DiscoveryError>;

    /// Publish this node's discovery record
    async fn advertise(&self, node: &AdvertisedNode) -> Result<(), DiscoveryError>;
}
