//! Registry configuration
//!
//! One explicit, strongly-typed configuration struct assembled before
//! `Registry::init`. Every knob the registry recognizes lives here with a
//! named field and a documented default; there is no dynamic
//! option-application layer.

use crate::types::NodeAddr;
use std::path::PathBuf;
use std::time::Duration;

/// How this node participates in the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Always run as a DHT server (answer queries, store records)
    Server,
    /// Always run as a client (query only)
    Client,
    /// Let the substrate decide based on reachability
    #[default]
    Auto,
}

/// NAT relay server settings
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Relay/STUN server address
    pub server: String,
    /// Credentials, when the relay requires them
    pub username: String,
    /// Password matching `username`
    pub password: String,
}

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Run mode for the DHT substrate
    pub mode: RunMode,

    /// Network namespace scoping our DHT records
    pub namespace: String,

    /// Display name registered for this node
    pub node_name: String,

    /// Version string published in records
    pub node_version: String,

    /// Statically configured bootstrap addresses
    pub bootstrap_addrs: Vec<NodeAddr>,

    /// Attempts per bootstrap pass before giving up until the next tick
    pub bootstrap_retries: u32,

    /// Interval between bootstrap passes
    pub bootstrap_interval: Duration,

    /// Enable local-network discovery
    pub enable_local_discovery: bool,

    /// Interval between local-discovery refresh passes
    pub discovery_refresh_interval: Duration,

    /// Bounded timeout for transport connect attempts
    pub connect_timeout: Duration,

    /// Interval between registration refresh passes
    pub registration_interval: Duration,

    /// Identity seed file; required at `init`
    pub key_file: Option<PathBuf>,

    /// NAT relay server settings, consumed by the substrate's relay
    /// transport; when set, `init` requires a relay transport collaborator
    pub relay: Option<RelayConfig>,

    /// Interval between NAT health-check ticks
    pub nat_refresh_interval: Duration,

    /// Age beyond which the cached NAT mapping is refreshed before use
    pub nat_staleness: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Auto,
            namespace: "roster".to_string(),
            node_name: "roster-node".to_string(),
            node_version: env!("CARGO_PKG_VERSION").to_string(),
            bootstrap_addrs: Vec::new(),
            bootstrap_retries: 3,
            bootstrap_interval: Duration::from_secs(60),
            enable_local_discovery: true,
            discovery_refresh_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            registration_interval: Duration::from_secs(30),
            key_file: None,
            relay: None,
            nat_refresh_interval: Duration::from_secs(10),
            nat_staleness: Duration::from_secs(8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.mode, RunMode::Auto);
        assert_eq!(config.namespace, "roster");
        assert!(config.enable_local_discovery);
        assert!(config.key_file.is_none());
        assert!(config.relay.is_none());
        assert_eq!(config.bootstrap_retries, 3);
        assert!(config.nat_staleness < config.nat_refresh_interval);
    }

    #[test]
    fn test_run_mode_default() {
        assert_eq!(RunMode::default(), RunMode::Auto);
    }
}
