//! Shared fakes for registry integration tests
//!
//! In-process stand-ins for the transport host, the DHT, the multicast
//! beacon, and the NAT relay. Each fake records what was asked of it so
//! tests can assert on substrate traffic, and exposes knobs for the
//! failure modes the registry must tolerate.

use async_trait::async_trait;
use roster_core::namespace::Cid;
use roster_core::{
    Dht, Host, NamespaceValidator, NodeAddr, PeerId, RegistryConfig, RunMode, SubstrateError,
};
use roster_discovery::{AdvertisedNode, Beacon, DiscoveryError};
use roster_nat::{NatError, RelayTransport};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Transport host fake
///
/// Connections succeed only for peers marked reachable; successful
/// connects move the peer into the connected set, like a real host would.
pub struct FakeHost {
    id: PeerId,
    listen: Vec<String>,
    connected: Mutex<HashSet<PeerId>>,
    reachable: Mutex<HashSet<PeerId>>,
    addrs: Mutex<HashMap<PeerId, Vec<String>>>,
}

impl FakeHost {
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            listen: vec!["/ip4/127.0.0.1/tcp/4001".to_string()],
            connected: Mutex::new(HashSet::new()),
            reachable: Mutex::new(HashSet::new()),
            addrs: Mutex::new(HashMap::new()),
        }
    }

    /// Mark a peer as connected with a known address
    pub fn add_connected(&self, peer: PeerId, addr: &str) {
        self.connected.lock().unwrap().insert(peer);
        self.addrs
            .lock()
            .unwrap()
            .entry(peer)
            .or_default()
            .push(addr.to_string());
    }

    /// Allow future connect attempts to this peer to succeed
    pub fn add_reachable(&self, peer: PeerId) {
        self.reachable.lock().unwrap().insert(peer);
    }

    /// Record a peerstore address without a live connection
    pub fn add_peer_addr(&self, peer: PeerId, addr: &str) {
        self.addrs
            .lock()
            .unwrap()
            .entry(peer)
            .or_default()
            .push(addr.to_string());
    }
}

#[async_trait]
impl Host for FakeHost {
    fn local_id(&self) -> PeerId {
        self.id
    }

    fn listen_addrs(&self) -> Vec<String> {
        self.listen.clone()
    }

    async fn connect(&self, addr: &NodeAddr) -> Result<(), SubstrateError> {
        if self.reachable.lock().unwrap().contains(&addr.peer) {
            self.connected.lock().unwrap().insert(addr.peer);
            Ok(())
        } else {
            Err(SubstrateError::Unreachable(addr.to_string()))
        }
    }

    fn is_connected(&self, peer: &PeerId) -> bool {
        self.connected.lock().unwrap().contains(peer)
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.connected.lock().unwrap().iter().copied().collect()
    }

    fn peer_addrs(&self, peer: &PeerId) -> Vec<String> {
        self.addrs
            .lock()
            .unwrap()
            .get(peer)
            .cloned()
            .unwrap_or_default()
    }
}

/// In-memory DHT fake
///
/// Writes go through the installed validator, as the real substrate
/// enforces. Provider results and routing table size are test-controlled.
pub struct FakeDht {
    records: Mutex<HashMap<String, Vec<u8>>>,
    providers: Mutex<Vec<PeerId>>,
    announced: Mutex<Vec<Cid>>,
    validator: Mutex<Option<NamespaceValidator>>,
    run_mode: Mutex<Option<RunMode>>,
    routing_table: AtomicUsize,
    bootstrap_calls: Mutex<Vec<Vec<NodeAddr>>>,
    defaults: Mutex<Vec<NodeAddr>>,
    get_calls: AtomicUsize,
}

impl FakeDht {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            providers: Mutex::new(Vec::new()),
            announced: Mutex::new(Vec::new()),
            validator: Mutex::new(None),
            run_mode: Mutex::new(None),
            routing_table: AtomicUsize::new(0),
            bootstrap_calls: Mutex::new(Vec::new()),
            defaults: Mutex::new(Vec::new()),
            get_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_routing_table_size(&self, size: usize) {
        self.routing_table.store(size, Ordering::SeqCst);
    }

    pub fn set_default_bootstrap_peers(&self, peers: Vec<NodeAddr>) {
        *self.defaults.lock().unwrap() = peers;
    }

    /// Seed a provider result for the next `find_providers` call
    pub fn add_provider(&self, peer: PeerId) {
        self.providers.lock().unwrap().push(peer);
    }

    /// Seed a stored record, bypassing the validator
    pub fn seed_record(&self, key: &str, value: Vec<u8>) {
        self.records.lock().unwrap().insert(key.to_string(), value);
    }

    pub fn record(&self, key: &str) -> Option<Vec<u8>> {
        self.records.lock().unwrap().get(key).cloned()
    }

    pub fn announced_cids(&self) -> Vec<Cid> {
        self.announced.lock().unwrap().clone()
    }

    pub fn has_validator(&self) -> bool {
        self.validator.lock().unwrap().is_some()
    }

    pub fn run_mode(&self) -> Option<RunMode> {
        *self.run_mode.lock().unwrap()
    }

    pub fn bootstrap_calls(&self) -> Vec<Vec<NodeAddr>> {
        self.bootstrap_calls.lock().unwrap().clone()
    }

    pub fn get_call_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

impl Default for FakeDht {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dht for FakeDht {
    fn set_run_mode(&self, mode: RunMode) {
        *self.run_mode.lock().unwrap() = Some(mode);
    }

    fn install_validator(&self, validator: NamespaceValidator) {
        *self.validator.lock().unwrap() = Some(validator);
    }

    async fn put_value(&self, key: &str, value: Vec<u8>) -> Result<(), SubstrateError> {
        if let Some(validator) = self.validator.lock().unwrap().as_ref() {
            validator
                .validate(key, &value)
                .map_err(|e| SubstrateError::Protocol(e.to_string()))?;
        }
        self.records
            .lock()
            .unwrap()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>, SubstrateError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    async fn provide(&self, cid: Cid) -> Result<(), SubstrateError> {
        self.announced.lock().unwrap().push(cid);
        Ok(())
    }

    async fn find_providers(
        &self,
        _cid: Cid,
        limit: usize,
    ) -> Result<Vec<PeerId>, SubstrateError> {
        let providers = self.providers.lock().unwrap();
        Ok(providers.iter().take(limit).copied().collect())
    }

    async fn bootstrap(&self, candidates: &[NodeAddr]) -> Result<(), SubstrateError> {
        self.bootstrap_calls
            .lock()
            .unwrap()
            .push(candidates.to_vec());
        Ok(())
    }

    async fn refresh_routing_table(&self) -> Result<(), SubstrateError> {
        Ok(())
    }

    fn routing_table_size(&self) -> usize {
        self.routing_table.load(Ordering::SeqCst)
    }

    fn default_bootstrap_peers(&self) -> Vec<NodeAddr> {
        self.defaults.lock().unwrap().clone()
    }
}

/// Beacon fake recording advertisements
pub struct FakeBeacon {
    advertised: Mutex<Vec<AdvertisedNode>>,
}

impl FakeBeacon {
    pub fn new() -> Self {
        Self {
            advertised: Mutex::new(Vec::new()),
        }
    }

    pub fn advertised(&self) -> Vec<AdvertisedNode> {
        self.advertised.lock().unwrap().clone()
    }
}

impl Default for FakeBeacon {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Beacon for FakeBeacon {
    async fn start(&self) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn advertise(&self, node: &AdvertisedNode) -> Result<(), DiscoveryError> {
        self.advertised.lock().unwrap().push(node.clone());
        Ok(())
    }
}

/// Relay transport fake with fixed addresses
pub struct StaticRelay {
    relay_addr: String,
    mapped_addr: String,
}

impl StaticRelay {
    pub fn new(relay_addr: &str, mapped_addr: &str) -> Self {
        Self {
            relay_addr: relay_addr.to_string(),
            mapped_addr: mapped_addr.to_string(),
        }
    }
}

#[async_trait]
impl RelayTransport for StaticRelay {
    async fn allocate_relay(&self) -> Result<Vec<String>, NatError> {
        Ok(vec![self.relay_addr.clone()])
    }

    async fn discover_mapping(&self) -> Result<String, NatError> {
        Ok(self.mapped_addr.clone())
    }
}

/// A config suitable for deterministic tests: background tickers pushed
/// out far enough that only explicit calls drive state changes
pub fn test_config(dir: &Path) -> RegistryConfig {
    RegistryConfig {
        node_name: "alpha".to_string(),
        bootstrap_interval: Duration::from_secs(3600),
        registration_interval: Duration::from_secs(3600),
        discovery_refresh_interval: Duration::from_secs(3600),
        nat_refresh_interval: Duration::from_secs(3600),
        enable_local_discovery: false,
        key_file: Some(dir.join("node.key")),
        ..RegistryConfig::default()
    }
}
