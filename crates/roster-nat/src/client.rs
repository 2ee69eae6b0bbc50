//! NAT traversal client
//!
//! At most one relay allocation and one external-mapping observation per
//! process, refreshed in place. Relay and mapped addresses accumulate
//! across refresh cycles; stale entries are not pruned.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::time;

/// NAT traversal errors
#[derive(Debug, Error, Clone)]
pub enum NatError {
    /// A relay allocation already exists for this client
    ///
    /// Treated as success by the refresh path.
    #[error("relay already allocated")]
    AlreadyAllocated,

    /// Relay server unreachable
    #[error("relay unreachable: {0}")]
    Unreachable(String),

    /// Request timed out
    #[error("relay request timed out: {0}")]
    Timeout(String),

    /// Credentials rejected
    #[error("relay credentials rejected: {0}")]
    Credentials(String),

    /// Protocol-level failure
    #[error("relay protocol error: {0}")]
    Protocol(String),
}

/// Relay/STUN operations consumed by the client
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Allocate a relay transport address for this node
    ///
    /// Returns the relay addresses peers can use to reach us. A second
    /// allocation attempt may fail with [`NatError::AlreadyAllocated`].
    async fn allocate_relay(&self) -> Result<Vec<String>, NatError>;

    /// Send a binding request and learn our externally-mapped address
    async fn discover_mapping(&self) -> Result<String, NatError>;
}

/// Point-in-time view of the NAT session state
#[derive(Debug, Clone, Default)]
pub struct NatSnapshot {
    /// Accumulated relay addresses
    pub relay_addrs: Vec<String>,
    /// Accumulated externally-observed addresses
    pub mapped_addrs: Vec<String>,
    /// When the mapping was last confirmed
    pub last_refreshed: Option<Instant>,
}

#[derive(Debug, Default)]
struct NatState {
    relay_addrs: Vec<String>,
    mapped_addrs: Vec<String>,
    last_refreshed: Option<Instant>,
    relay_allocated: bool,
}

/// NAT traversal client
///
/// Cloning shares the same session state; the health-check loop and
/// opportunistic query-time refreshes serialize on one internal lock.
#[derive(Clone)]
pub struct NatClient {
    transport: Arc<dyn RelayTransport>,
    state: Arc<Mutex<NatState>>,
    refresh_interval: Duration,
    staleness: Duration,
    shutdown: Arc<watch::Sender<bool>>,
    running: Arc<AtomicBool>,
}

impl NatClient {
    /// Create a client over a relay transport
    #[must_use]
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        refresh_interval: Duration,
        staleness: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            transport,
            state: Arc::new(Mutex::new(NatState::default())),
            refresh_interval,
            staleness,
            shutdown: Arc::new(shutdown),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background health-check loop
    ///
    /// Performs one refresh immediately, then one per interval. Calling
    /// `start` again while running is a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = self.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = time::interval(this.refresh_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => this.refresh().await,
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::debug!("NAT health-check loop stopped");
        });
    }

    /// Stop the health-check loop
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown.send(true);
        }
    }

    /// One refresh: ensure a relay allocation exists and re-learn the
    /// external mapping
    ///
    /// Failures are logged and retried on the next tick; the whole
    /// operation holds the session lock, serializing the ticker against
    /// query-time refreshes.
    pub async fn refresh(&self) {
        let mut state = self.state.lock().await;

        if !state.relay_allocated {
            match self.transport.allocate_relay().await {
                Ok(addrs) => {
                    for addr in addrs {
                        if !state.relay_addrs.contains(&addr) {
                            state.relay_addrs.push(addr);
                        }
                    }
                    state.relay_allocated = true;
                    tracing::info!(relays = state.relay_addrs.len(), "relay allocated");
                }
                Err(NatError::AlreadyAllocated) => {
                    state.relay_allocated = true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "relay allocation failed, retrying next tick");
                }
            }
        }

        match self.transport.discover_mapping().await {
            Ok(addr) => {
                if !state.mapped_addrs.contains(&addr) {
                    tracing::info!(mapped = %addr, "external mapping observed");
                    state.mapped_addrs.push(addr);
                }
                state.last_refreshed = Some(Instant::now());
            }
            Err(e) => {
                tracing::warn!(error = %e, "mapping discovery failed, retrying next tick");
            }
        }
    }

    /// Refresh only when the cached mapping is older than the staleness
    /// threshold (query-path entry point)
    pub async fn refresh_if_stale(&self) {
        if !self.is_fresh().await {
            self.refresh().await;
        }
    }

    /// Whether the cached mapping is younger than the staleness threshold
    pub async fn is_fresh(&self) -> bool {
        self.state
            .lock()
            .await
            .last_refreshed
            .is_some_and(|t| t.elapsed() < self.staleness)
    }

    /// All relay and externally-mapped addresses accumulated so far
    pub async fn addresses(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .relay_addrs
            .iter()
            .chain(state.mapped_addrs.iter())
            .cloned()
            .collect()
    }

    /// Snapshot of the full session state
    pub async fn snapshot(&self) -> NatSnapshot {
        let state = self.state.lock().await;
        NatSnapshot {
            relay_addrs: state.relay_addrs.clone(),
            mapped_addrs: state.mapped_addrs.clone(),
            last_refreshed: state.last_refreshed,
        }
    }
}
