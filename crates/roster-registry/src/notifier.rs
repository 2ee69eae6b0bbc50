//! Connection notifier subserver
//!
//! A host-level companion to the registry: consumes connect/disconnect
//! events from the transport over a channel and persists peer connection
//! history. Independently owned; the registry does not start or stop it.

use crate::store::{ConnEventRow, RecordStore};
use crate::store::unix_now;
use roster_core::ConnEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Persists transport connection events
pub struct ConnectionNotifier;

impl ConnectionNotifier {
    /// Spawn the notifier task over an event channel
    ///
    /// The task runs until the sender side is dropped. Persistence
    /// failures are logged and the stream continues.
    pub fn spawn(
        store: Arc<dyn RecordStore>,
        mut events: mpsc::Receiver<ConnEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let row = match event {
                    ConnEvent::Connected { peer, addr } => ConnEventRow {
                        peer_id: peer.to_hex(),
                        addr: Some(addr),
                        kind: "connected".to_string(),
                        occurred_at: unix_now(),
                    },
                    ConnEvent::Disconnected { peer } => ConnEventRow {
                        peer_id: peer.to_hex(),
                        addr: None,
                        kind: "disconnected".to_string(),
                        occurred_at: unix_now(),
                    },
                };
                if let Err(e) = store.record_connection(&row).await {
                    tracing::warn!(peer = %row.peer_id, error = %e, "failed to persist connection event");
                }
            }
            tracing::debug!("connection notifier stopped, event channel closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use roster_core::PeerId;

    #[tokio::test]
    async fn test_events_persisted_in_arrival_order() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.migrate().await.unwrap();

        let (tx, rx) = mpsc::channel(8);
        let handle = ConnectionNotifier::spawn(store.clone(), rx);

        let peer = PeerId::from_bytes([9u8; 32]);
        tx.send(ConnEvent::Connected {
            peer,
            addr: "/ip4/10.0.0.9/tcp/4001".to_string(),
        })
        .await
        .unwrap();
        tx.send(ConnEvent::Disconnected { peer }).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let history = store.connection_history(&peer.to_hex()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, "connected");
        assert_eq!(
            history[0].addr.as_deref(),
            Some("/ip4/10.0.0.9/tcp/4001")
        );
        assert_eq!(history[1].kind, "disconnected");
        assert!(history[1].addr.is_none());
    }

    #[tokio::test]
    async fn test_notifier_exits_when_channel_closes() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.migrate().await.unwrap();

        let (tx, rx) = mpsc::channel::<ConnEvent>(1);
        let handle = ConnectionNotifier::spawn(store, rx);
        drop(tx);
        handle.await.unwrap();
    }
}
