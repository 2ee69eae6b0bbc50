//! Local discovery service
//!
//! Maintains the two-stage lifecycle of locally discovered peers:
//! `found` (just seen, liveness unknown) and `refreshed` (confirmed
//! connected). A periodic refresh pass promotes found entries that are
//! connected or become connectable within the connect timeout, and drops
//! the rest; dropped entries are not retried until rediscovered.

use crate::beacon::{AdvertisedNode, Beacon};
use roster_core::{Host, NodeAddr};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex, Notify};
use tokio::time;

/// Discovery errors
///
/// Steady-state operation never produces these; they only cover service
/// lifecycle misuse and beacon startup failures.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The beacon primitive failed
    #[error("beacon error: {0}")]
    Beacon(String),

    /// `start` called while already running
    #[error("discovery already running")]
    AlreadyRunning,

    /// `stop` or `advertise_node` called before `start`
    #[error("discovery not running")]
    NotRunning,
}

/// Tunables for the refresh cycle
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Interval between refresh passes
    pub refresh_interval: Duration,
    /// Bounded timeout per connect attempt during a pass
    pub connect_timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Callback invoked for every newly found peer
///
/// Callbacks are invoked in registration order, outside any service lock,
/// and must not call back into the service (fire-and-forget contract; no
/// unregister).
pub type DiscoveryCallback = Arc<dyn Fn(NodeAddr) + Send + Sync>;

/// Local-network discovery service
#[derive(Clone)]
pub struct LocalDiscovery {
    beacon: Arc<dyn Beacon>,
    host: Arc<dyn Host>,
    options: DiscoveryOptions,
    /// Just-seen peers, keyed by full address string
    found: Arc<Mutex<HashMap<String, NodeAddr>>>,
    /// Peers confirmed live this cycle
    refreshed: Arc<Mutex<HashMap<String, NodeAddr>>>,
    watchers: Arc<std::sync::Mutex<Vec<DiscoveryCallback>>>,
    /// Held for the whole duration of a refresh pass
    refresh_gate: Arc<Mutex<()>>,
    /// Kicks an out-of-band refresh pass
    kick: Arc<Notify>,
    shutdown: Arc<watch::Sender<bool>>,
    running: Arc<AtomicBool>,
}

impl LocalDiscovery {
    /// Create the service around a beacon primitive and the transport host
    #[must_use]
    pub fn new(beacon: Arc<dyn Beacon>, host: Arc<dyn Host>, options: DiscoveryOptions) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            beacon,
            host,
            options,
            found: Arc::new(Mutex::new(HashMap::new())),
            refreshed: Arc::new(Mutex::new(HashMap::new())),
            watchers: Arc::new(std::sync::Mutex::new(Vec::new())),
            refresh_gate: Arc::new(Mutex::new(())),
            kick: Arc::new(Notify::new()),
            shutdown: Arc::new(shutdown),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the beacon and the refresh loop
    ///
    /// # Errors
    ///
    /// Returns an error if already running or if the beacon fails to start.
    pub async fn start(&self) -> Result<(), DiscoveryError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DiscoveryError::AlreadyRunning);
        }
        self.beacon.start().await?;

        let this = self.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = time::interval(this.options.refresh_interval);
            ticker.tick().await; // consume the immediate tick
            loop {
                tokio::select! {
                    _ = ticker.tick() => this.refresh_pass().await,
                    _ = this.kick.notified() => this.refresh_pass().await,
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::debug!("local discovery refresh loop stopped");
        });
        Ok(())
    }

    /// Stop the refresh loop and the beacon
    ///
    /// # Errors
    ///
    /// Returns an error if not running.
    pub async fn stop(&self) -> Result<(), DiscoveryError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(DiscoveryError::NotRunning);
        }
        let _ = self.shutdown.send(true);
        self.beacon.stop().await
    }

    /// Register a discovery callback (fire-and-forget, no unregister)
    pub fn watch(&self, callback: impl Fn(NodeAddr) + Send + Sync + 'static) {
        self.watchers
            .lock()
            .expect("watcher lock poisoned")
            .push(Arc::new(callback));
    }

    /// Publish this node's discovery record on the local segment
    ///
    /// # Errors
    ///
    /// Returns a beacon error if advertisement fails.
    pub async fn advertise_node(&self, node: &AdvertisedNode) -> Result<(), DiscoveryError> {
        self.beacon.advertise(node).await
    }

    /// Invoked by the substrate when a peer is seen on the local segment
    ///
    /// Adds (or overwrites) the entry in `found`, notifies watchers, and
    /// triggers an immediate out-of-band refresh pass.
    pub async fn handle_peer_found(&self, addr: NodeAddr) {
        tracing::debug!(peer = %addr.peer, "peer found on local segment");
        self.found
            .lock()
            .await
            .insert(addr.to_string(), addr.clone());

        let watchers: Vec<DiscoveryCallback> = self
            .watchers
            .lock()
            .expect("watcher lock poisoned")
            .clone();
        for watcher in watchers {
            watcher(addr.clone());
        }

        self.kick.notify_one();
    }

    /// One refresh pass over the `found` set
    ///
    /// Connected entries are promoted; the rest get one bounded-timeout
    /// connect attempt and are dropped on failure. Worst case duration is
    /// bounded by `found_len * connect_timeout`.
    pub async fn refresh_pass(&self) {
        let _gate = self.refresh_gate.lock().await;

        let entries: Vec<(String, NodeAddr)> = self
            .found
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (key, addr) in entries {
            if self.host.is_connected(&addr.peer) {
                self.promote(&key, addr).await;
                continue;
            }

            match time::timeout(self.options.connect_timeout, self.host.connect(&addr)).await {
                Ok(Ok(())) => self.promote(&key, addr).await,
                Ok(Err(e)) => {
                    tracing::warn!(peer = %addr.peer, error = %e, "discovery connect failed, dropping entry");
                    self.found.lock().await.remove(&key);
                }
                Err(_) => {
                    tracing::warn!(peer = %addr.peer, "discovery connect timed out, dropping entry");
                    self.found.lock().await.remove(&key);
                }
            }
        }
    }

    async fn promote(&self, key: &str, addr: NodeAddr) {
        self.found.lock().await.remove(key);
        self.refreshed.lock().await.insert(key.to_string(), addr);
    }

    /// Snapshot of the found set
    pub async fn found_snapshot(&self) -> Vec<NodeAddr> {
        self.found.lock().await.values().cloned().collect()
    }

    /// Snapshot of the refreshed (confirmed live) set
    pub async fn refreshed_snapshot(&self) -> Vec<NodeAddr> {
        self.refreshed.lock().await.values().cloned().collect()
    }
}
