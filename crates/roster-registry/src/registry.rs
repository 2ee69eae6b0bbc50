//! Registry core
//!
//! Owns the peer cache, the per-identity registration refresh loops, the
//! bootstrap loop, and the query paths. All collaborators are injected
//! through [`RegistryDeps`]; the registry is a value the node's startup
//! sequence owns and passes around, not a process-wide singleton.
//!
//! Registration states: unregistered, then registering, then registered
//! (re-entered every refresh tick), then deregistered. The DHT cannot
//! delete, so deregistration writes an empty tombstone under the same
//! key and replicas may serve stale values until their own TTL expires.

use crate::bootstrap;
use crate::error::{RegistryError, Result};
use crate::query::{QueryOpts, REGISTER_TYPE_CONNECTED, REGISTER_TYPE_DHT};
use crate::store::{unix_now, RecordStore, RegisterRecord};
use roster_core::types::{META_HOST, META_REGISTER_TYPE};
use roster_core::{
    member_cid, peers_cid, record_key, Dht, Host, Identity, NamespaceValidator, NodeAddr, PeerId,
    PeerRecord, RegisterKind, Registration, RegistryConfig, SignedEnvelope,
};
use roster_discovery::{AdvertisedNode, Beacon, DiscoveryOptions, LocalDiscovery};
use roster_nat::{NatClient, RelayTransport};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time;

/// Timeout for provider announcements
const PROVIDE_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for DHT record writes (publish and tombstone)
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for DHT record fetches
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for the provider search on the list path
const PROVIDER_SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
/// Timeout for the periodic routing-table refresh
const ROUTING_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);
/// Cap on providers pulled per list query
const PROVIDER_SEARCH_LIMIT: usize = 64;

/// External collaborators handed to [`Registry::init`]
pub struct RegistryDeps {
    /// Transport host
    pub host: Arc<dyn Host>,
    /// DHT substrate
    pub dht: Arc<dyn Dht>,
    /// Persistence collaborator; required
    pub store: Option<Arc<dyn RecordStore>>,
    /// Relay transport for NAT traversal; optional
    pub relay: Option<Arc<dyn RelayTransport>>,
    /// Multicast beacon for local discovery; optional
    pub beacon: Option<Arc<dyn Beacon>>,
}

struct Inner {
    config: RegistryConfig,
    identity: Identity,
    host: Arc<dyn Host>,
    dht: Arc<dyn Dht>,
    store: Arc<dyn RecordStore>,
    nat: Option<NatClient>,
    discovery: Option<LocalDiscovery>,
    /// Peer cache: registrations currently being refreshed
    registrations: RwLock<HashMap<String, Registration>>,
    /// Identities with a live refresh loop; guards against duplicate loops
    active_loops: std::sync::Mutex<HashSet<String>>,
    /// Bootstrap candidates seen via local discovery; additive for the
    /// process lifetime
    discovered: Arc<std::sync::Mutex<HashMap<String, NodeAddr>>>,
    shutdown: watch::Sender<bool>,
}

/// The registry and discovery coordinator
///
/// Cloning is cheap and shares all state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    /// One-time setup: validate configuration, migrate the store, install
    /// the namespace validator, start the satellite coordinators and the
    /// bootstrap loop, and register this node's own record.
    ///
    /// # Errors
    ///
    /// Fails when no persistence store or no identity key file is
    /// configured, when the identity cannot be loaded, or when the store
    /// migration fails. Satellite startup failures (local discovery, NAT)
    /// are logged and degrade the node instead of aborting it.
    pub async fn init(config: RegistryConfig, deps: RegistryDeps) -> Result<Self> {
        let store = deps
            .store
            .ok_or_else(|| RegistryError::config("persistence store not configured"))?;
        let key_file = config
            .key_file
            .clone()
            .ok_or_else(|| RegistryError::config("identity key file not configured"))?;
        if config.relay.is_some() && deps.relay.is_none() {
            return Err(RegistryError::config(
                "relay server configured but no relay transport provided",
            ));
        }
        let identity = Identity::load_or_generate(&key_file)?;

        store.migrate().await?;
        deps.dht.set_run_mode(config.mode);
        deps.dht
            .install_validator(NamespaceValidator::new(config.namespace.clone()));

        let discovery = if config.enable_local_discovery {
            deps.beacon.map(|beacon| {
                LocalDiscovery::new(
                    beacon,
                    deps.host.clone(),
                    DiscoveryOptions {
                        refresh_interval: config.discovery_refresh_interval,
                        connect_timeout: config.connect_timeout,
                    },
                )
            })
        } else {
            None
        };

        let nat = deps.relay.map(|relay| {
            NatClient::new(relay, config.nat_refresh_interval, config.nat_staleness)
        });

        let (shutdown, _) = watch::channel(false);
        let registry = Registry {
            inner: Arc::new(Inner {
                config,
                identity,
                host: deps.host,
                dht: deps.dht,
                store,
                nat,
                discovery,
                registrations: RwLock::new(HashMap::new()),
                active_loops: std::sync::Mutex::new(HashSet::new()),
                discovered: Arc::new(std::sync::Mutex::new(HashMap::new())),
                shutdown,
            }),
        };

        registry.start_local_discovery().await;
        registry.spawn_bootstrap_loop();
        if let Some(nat) = &registry.inner.nat {
            nat.start();
        }

        // Register our own presence
        let mut own = Registration::new(
            registry.inner.identity.peer_id().to_hex(),
            registry.inner.config.node_name.clone(),
            RegisterKind::Node,
        );
        own.namespaces = vec![registry.inner.config.namespace.clone()];
        own.addresses = registry.inner.host.listen_addrs();
        registry.register(own).await?;

        Ok(registry)
    }

    /// This node's transport identity
    #[must_use]
    pub fn local_id(&self) -> PeerId {
        self.inner.host.local_id()
    }

    /// Start the periodic publish loop for a registration
    ///
    /// Returns promptly; the loop runs in the background until the
    /// identity is deregistered or the registry shuts down. Re-registering
    /// an identity whose loop is still running updates the cached record
    /// without spawning a second loop.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidRegistration`] when `id` or `name`
    /// is empty.
    pub async fn register(&self, registration: Registration) -> Result<()> {
        if registration.id.trim().is_empty() {
            return Err(RegistryError::registration("registration ID is required"));
        }
        if registration.name.trim().is_empty() {
            return Err(RegistryError::registration("registration name is required"));
        }

        let mut registration = registration;
        registration
            .metadata
            .insert(META_HOST.to_string(), self.inner.host.local_id().to_hex());

        let id = registration.id.clone();
        self.inner
            .registrations
            .write()
            .await
            .insert(id.clone(), registration);

        self.spawn_refresh_loop(id);
        Ok(())
    }

    /// Spawn the refresh loop for an identity unless one is already live
    ///
    /// The exiting loop re-checks the cache after leaving the loop set: a
    /// concurrent `register` may have re-inserted the identity between the
    /// loop's last cache read and its removal from the set, in which case
    /// the identity would otherwise sit in the cache with no loop.
    fn spawn_refresh_loop(&self, id: String) {
        {
            let mut loops = self
                .inner
                .active_loops
                .lock()
                .expect("active loop lock poisoned");
            if !loops.insert(id.clone()) {
                // Loop already running for this identity; it picks up the
                // updated record on its next tick
                return;
            }
        }

        let this = self.clone();
        let mut shutdown_rx = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = time::interval(this.inner.config.registration_interval);
            ticker.tick().await;
            loop {
                let current = this.inner.registrations.read().await.get(&id).cloned();
                let Some(current) = current else { break };
                this.registration_pass(&current).await;
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
            this.inner
                .active_loops
                .lock()
                .expect("active loop lock poisoned")
                .remove(&id);
            tracing::debug!(id = %id, "registration loop stopped");

            if !*shutdown_rx.borrow()
                && this.inner.registrations.read().await.contains_key(&id)
            {
                this.spawn_refresh_loop(id);
            }
        });
    }

    /// Force one registration pass for an identity right now
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidRegistration`] when the identity is
    /// not registered.
    pub async fn refresh_now(&self, id: &str) -> Result<()> {
        let registration = self
            .inner
            .registrations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::registration("identity is not registered"))?;
        self.registration_pass(&registration).await;
        Ok(())
    }

    /// One registration pass: provider announcement, persistence, DHT
    /// publish. The three steps are independent; a failure in one is
    /// logged and the others still run.
    async fn registration_pass(&self, registration: &Registration) {
        let ns = &self.inner.config.namespace;

        // Provider announcement: the shared peers identifier plus our own.
        // Runs before sealing; it does not need the envelope.
        for cid in [peers_cid(ns), member_cid(ns, &registration.id)] {
            match time::timeout(PROVIDE_TIMEOUT, self.inner.dht.provide(cid)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(id = %registration.id, error = %e, "provider announcement failed");
                }
                Err(_) => {
                    tracing::warn!(id = %registration.id, "provider announcement timed out");
                }
            }
        }

        let record = PeerRecord {
            id: registration.id.clone(),
            name: registration.name.clone(),
            version: self.inner.config.node_version.clone(),
            metadata: registration.metadata.clone(),
        };
        let envelope = match SignedEnvelope::seal(&self.inner.identity, &record) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(id = %registration.id, error = %e, "failed to seal record, skipping persist and publish");
                return;
            }
        };

        // Persistence
        let now = unix_now();
        let row = RegisterRecord {
            id: 0,
            peer_id: registration.id.clone(),
            name: registration.name.clone(),
            host_id: self.inner.host.local_id().to_hex(),
            version: self.inner.config.node_version.clone(),
            stations: serde_json::to_string(&registration.addresses)
                .unwrap_or_else(|_| "[]".to_string()),
            signature: hex::encode(&envelope.signature),
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.inner.store.upsert_registration(&row).await {
            tracing::warn!(id = %registration.id, error = %e, "failed to persist register record");
        }

        // DHT publish, guarded: writing into a DHT with no peers would
        // propagate nowhere
        if self.inner.dht.routing_table_size() == 0 {
            tracing::debug!(id = %registration.id, "routing table empty, skipping DHT publish");
            return;
        }
        let key = record_key(ns, &registration.id);
        match envelope.to_bytes() {
            Ok(bytes) => {
                match time::timeout(PUBLISH_TIMEOUT, self.inner.dht.put_value(&key, bytes)).await {
                    Ok(Ok(())) => {
                        tracing::debug!(id = %registration.id, "record published");
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(id = %registration.id, error = %e, "DHT publish failed");
                    }
                    Err(_) => {
                        tracing::warn!(id = %registration.id, "DHT publish timed out");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(id = %registration.id, error = %e, "failed to encode envelope");
            }
        }
    }

    /// Remove an identity from the cache and write a best-effort tombstone
    ///
    /// The refresh loop for the identity exits on its next wakeup. DHT
    /// replicas may keep serving the old record until their TTL expires.
    ///
    /// # Errors
    ///
    /// Currently infallible; tombstone write failures are logged only.
    pub async fn deregister(&self, id: &str) -> Result<()> {
        self.inner.registrations.write().await.remove(id);

        let key = record_key(&self.inner.config.namespace, id);
        match time::timeout(PUBLISH_TIMEOUT, self.inner.dht.put_value(&key, Vec::new())).await {
            Ok(Ok(())) => tracing::debug!(id = %id, "tombstone written"),
            Ok(Err(e)) => tracing::warn!(id = %id, error = %e, "tombstone write failed"),
            Err(_) => tracing::warn!(id = %id, "tombstone write timed out"),
        }
        Ok(())
    }

    /// Query registered peers
    ///
    /// # Errors
    ///
    /// Returns a data error for malformed identities or undecodable DHT
    /// records; transient substrate failures degrade to empty or partial
    /// results instead.
    pub async fn query(&self, opts: QueryOpts) -> Result<Vec<Registration>> {
        match opts {
            QueryOpts::Me => Ok(vec![self.me()]),
            QueryOpts::Id(id) => self.query_by_id(&id).await,
            QueryOpts::Name(name) => {
                let mut all = self.query_all().await?;
                all.retain(|r| r.name == name);
                Ok(all)
            }
            QueryOpts::All => self.query_all().await,
        }
    }

    /// Watch for registry changes: not supported
    ///
    /// # Errors
    ///
    /// Always returns [`RegistryError::WatchNotSupported`].
    pub fn watch<F>(&self, _callback: F) -> Result<()>
    where
        F: Fn(Registration) + Send + Sync + 'static,
    {
        Err(RegistryError::WatchNotSupported)
    }

    /// The current bootstrap candidate set: static config, substrate
    /// defaults, and locally discovered peers, de-duplicated by address
    #[must_use]
    pub fn bootstrap_candidates(&self) -> Vec<NodeAddr> {
        let discovered: Vec<NodeAddr> = self
            .inner
            .discovered
            .lock()
            .expect("discovered lock poisoned")
            .values()
            .cloned()
            .collect();
        bootstrap::unify_candidates(
            &self.inner.config.bootstrap_addrs,
            &self.inner.dht.default_bootstrap_peers(),
            &discovered,
        )
    }

    /// Stop all background loops and satellite coordinators
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
        if let Some(discovery) = &self.inner.discovery {
            if let Err(e) = discovery.stop().await {
                tracing::debug!(error = %e, "local discovery stop");
            }
        }
        if let Some(nat) = &self.inner.nat {
            nat.stop();
        }
    }

    fn me(&self) -> Registration {
        let mut reg = Registration::new(
            self.inner.host.local_id().to_hex(),
            self.inner.config.node_name.clone(),
            RegisterKind::Node,
        );
        reg.namespaces = vec![self.inner.config.namespace.clone()];
        reg.addresses = self.inner.host.listen_addrs();
        reg.metadata
            .insert(META_HOST.to_string(), self.inner.host.local_id().to_hex());
        reg
    }

    async fn query_by_id(&self, id: &str) -> Result<Vec<Registration>> {
        let peer = PeerId::from_hex(id)?;
        let mut addresses = self.inner.host.peer_addrs(&peer);

        let key = record_key(&self.inner.config.namespace, id);
        let value = match time::timeout(FETCH_TIMEOUT, self.inner.dht.get_value(&key)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                tracing::warn!(id = %id, error = %e, "DHT fetch failed, returning empty result");
                None
            }
            Err(_) => {
                tracing::warn!(id = %id, "DHT fetch timed out, returning empty result");
                None
            }
        };

        // No record, or a deregistration tombstone: empty result, not an
        // error
        let Some(bytes) = value else {
            return Ok(Vec::new());
        };
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let record = SignedEnvelope::open(&bytes)?;

        if let Some(nat) = &self.inner.nat {
            nat.refresh_if_stale().await;
            if nat.is_fresh().await {
                addresses.extend(nat.addresses().await);
            }
        }

        let mut reg = Registration::new(record.id, record.name, RegisterKind::Node);
        reg.metadata = record.metadata;
        reg.addresses = addresses;
        Ok(vec![reg])
    }

    async fn query_all(&self) -> Result<Vec<Registration>> {
        let me = self.inner.host.local_id();
        let bootstrap_peers: HashSet<PeerId> = self
            .inner
            .config
            .bootstrap_addrs
            .iter()
            .map(|a| a.peer)
            .chain(
                self.inner
                    .dht
                    .default_bootstrap_peers()
                    .iter()
                    .map(|a| a.peer),
            )
            .collect();

        let providers = match time::timeout(
            PROVIDER_SEARCH_TIMEOUT,
            self.inner
                .dht
                .find_providers(peers_cid(&self.inner.config.namespace), PROVIDER_SEARCH_LIMIT),
        )
        .await
        {
            Ok(Ok(providers)) => providers,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "provider search failed");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!("provider search timed out");
                Vec::new()
            }
        };

        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for peer in providers {
            if peer == me || bootstrap_peers.contains(&peer) {
                continue;
            }
            let id = peer.to_hex();
            if !seen.insert(id.clone()) {
                continue;
            }

            let mut reg = Registration::new(id.clone(), id.clone(), RegisterKind::Node);
            reg.addresses = self.inner.host.peer_addrs(&peer);

            let key = record_key(&self.inner.config.namespace, &id);
            if let Ok(Ok(Some(bytes))) =
                time::timeout(FETCH_TIMEOUT, self.inner.dht.get_value(&key)).await
            {
                if !bytes.is_empty() {
                    match SignedEnvelope::open(&bytes) {
                        Ok(record) => {
                            reg.name = record.name;
                            reg.metadata = record.metadata;
                        }
                        Err(e) => {
                            tracing::warn!(peer = %id, error = %e, "ignoring malformed DHT record");
                        }
                    }
                }
            }

            reg.metadata.insert(
                META_REGISTER_TYPE.to_string(),
                REGISTER_TYPE_DHT.to_string(),
            );
            out.push(reg);
        }

        // Directly connected peers not already covered by the provider
        // search
        for peer in self.inner.host.connected_peers() {
            if peer == me {
                continue;
            }
            let id = peer.to_hex();
            if !seen.insert(id.clone()) {
                continue;
            }
            let mut reg = Registration::new(id.clone(), id.clone(), RegisterKind::Node);
            reg.addresses = self.inner.host.peer_addrs(&peer);
            reg.metadata.insert(
                META_REGISTER_TYPE.to_string(),
                REGISTER_TYPE_CONNECTED.to_string(),
            );
            out.push(reg);
        }

        Ok(out)
    }

    async fn start_local_discovery(&self) {
        let Some(discovery) = &self.inner.discovery else {
            return;
        };

        let discovered = self.inner.discovered.clone();
        discovery.watch(move |addr: NodeAddr| {
            discovered
                .lock()
                .expect("discovered lock poisoned")
                .insert(addr.to_string(), addr);
        });

        if let Err(e) = discovery.start().await {
            tracing::warn!(error = %e, "local discovery failed to start, continuing without it");
            return;
        }

        let advertised = AdvertisedNode {
            peer: self.inner.identity.peer_id(),
            name: self.inner.config.node_name.clone(),
            addresses: self.inner.host.listen_addrs(),
        };
        if let Err(e) = discovery.advertise_node(&advertised).await {
            tracing::warn!(error = %e, "failed to advertise node on local segment");
        }
    }

    /// Local discovery handle, when enabled (for wiring the substrate's
    /// peer-found callback)
    #[must_use]
    pub fn local_discovery(&self) -> Option<&LocalDiscovery> {
        self.inner.discovery.as_ref()
    }

    fn spawn_bootstrap_loop(&self) {
        let this = self.clone();
        let mut shutdown_rx = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = time::interval(this.inner.config.bootstrap_interval);
            ticker.tick().await;
            let mut pass: u64 = 0;
            loop {
                this.bootstrap_pass(pass).await;
                pass += 1;
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::debug!("bootstrap loop stopped");
        });
    }

    /// One bootstrap pass: recompute candidates, join via the substrate,
    /// and on alternating passes refresh the routing table
    async fn bootstrap_pass(&self, pass: u64) {
        let candidates = self.bootstrap_candidates();

        let retries = self.inner.config.bootstrap_retries.max(1);
        for attempt in 1..=retries {
            match self.inner.dht.bootstrap(&candidates).await {
                Ok(()) => {
                    tracing::debug!(candidates = candidates.len(), "bootstrap pass complete");
                    break;
                }
                Err(e) if attempt == retries => {
                    tracing::warn!(error = %e, attempts = attempt, "bootstrap pass failed");
                }
                Err(e) => {
                    tracing::debug!(error = %e, attempt, "bootstrap attempt failed, retrying");
                }
            }
        }

        if pass % 2 == 1 {
            match time::timeout(
                ROUTING_REFRESH_TIMEOUT,
                self.inner.dht.refresh_routing_table(),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "routing table refresh failed"),
                Err(_) => tracing::warn!("routing table refresh timed out"),
            }
        }
    }
}
