//! Connection registry for the streaming transport.
//!
//! A connection binds one remote caller to at most one browser session for
//! cleanup purposes; when the connection's push stream closes, its close
//! hooks run exactly once and destroy the bound session.

use autoapply_core::CloseHooks;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::protocol::StreamEvent;

pub struct Connection {
    pub connection_id: String,
    /// Sender feeding the currently-attached SSE stream. Replaced on
    /// reconnect; posts to a closing connection are accepted best-effort.
    tx: StdMutex<mpsc::Sender<StreamEvent>>,
    bound_session: Arc<StdMutex<Option<String>>>,
    pub close_hooks: Arc<CloseHooks>,
    /// Stream epoch: bumped on every reconnect so only the latest stream's
    /// drop guard triggers the close hooks.
    pub epoch: AtomicU64,
}

impl Connection {
    /// Push an event to the attached stream. Best-effort: a full or closed
    /// channel drops the event.
    pub async fn send(&self, event: StreamEvent) {
        let tx = {
            let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        if tx.send(event).await.is_err() {
            debug!(connection = %self.connection_id, "Dropping event for detached stream");
        }
    }

    /// Bind the first session opened through this connection; later sessions
    /// are left unbound (a connection couples to at most one session).
    pub fn bind_session(&self, session_id: &str) {
        let mut bound = self.bound_session.lock().unwrap_or_else(|e| e.into_inner());
        if bound.is_none() {
            info!(connection = %self.connection_id, session = session_id, "Session bound to connection");
            *bound = Some(session_id.to_string());
        }
    }

    pub fn bound_session(&self) -> Option<String> {
        self.bound_session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Shared handle for close hooks that must read the binding at fire time.
    pub fn bound_session_handle(&self) -> Arc<StdMutex<Option<String>>> {
        self.bound_session.clone()
    }
}

/// Result of opening (or re-opening) a push stream.
pub struct OpenedStream {
    pub connection: Arc<Connection>,
    pub rx: mpsc::Receiver<StreamEvent>,
    pub epoch: u64,
    pub is_new: bool,
}

pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Open a push stream. A supplied id bound to a live transport is reused
    /// (reconnection semantics: the fresh stream replaces the old one);
    /// otherwise a new connection id is minted and registered.
    pub async fn open(&self, requested_id: Option<String>) -> OpenedStream {
        let mut connections = self.connections.lock().await;

        if let Some(id) = &requested_id {
            if let Some(existing) = connections.get(id) {
                let (tx, rx) = mpsc::channel(64);
                {
                    let mut guard = existing.tx.lock().unwrap_or_else(|e| e.into_inner());
                    *guard = tx;
                }
                let epoch = existing.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                info!(connection = %id, epoch, "Stream reattached to existing connection");
                return OpenedStream {
                    connection: existing.clone(),
                    rx,
                    epoch,
                    is_new: false,
                };
            }
        }

        let connection_id = requested_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let (tx, rx) = mpsc::channel(64);
        let connection = Arc::new(Connection {
            connection_id: connection_id.clone(),
            tx: StdMutex::new(tx),
            bound_session: Arc::new(StdMutex::new(None)),
            close_hooks: Arc::new(CloseHooks::new()),
            epoch: AtomicU64::new(0),
        });
        connections.insert(connection_id.clone(), connection.clone());
        info!(connection = %connection_id, "Connection registered");
        OpenedStream {
            connection,
            rx,
            epoch: 0,
            is_new: true,
        }
    }

    pub async fn get(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.lock().await.get(connection_id).cloned()
    }

    pub async fn remove(&self, connection_id: &str) {
        if self.connections.lock().await.remove(connection_id).is_some() {
            info!(connection = connection_id, "Connection removed");
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_open_mints_connection_id() {
        let registry = ConnectionRegistry::new();
        let opened = registry.open(None).await;
        assert!(opened.is_new);
        assert_eq!(opened.epoch, 0);
        assert!(registry.get(&opened.connection.connection_id).await.is_some());
    }

    #[tokio::test]
    async fn test_reconnect_reuses_transport_and_bumps_epoch() {
        let registry = ConnectionRegistry::new();
        let first = registry.open(Some("c1".to_string())).await;
        let second = registry.open(Some("c1".to_string())).await;

        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(second.epoch, 1);
        assert!(Arc::ptr_eq(&first.connection, &second.connection));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_send_reaches_latest_stream_after_reconnect() {
        let registry = ConnectionRegistry::new();
        let first = registry.open(Some("c1".to_string())).await;
        let mut second = registry.open(Some("c1".to_string())).await;
        drop(first.rx);

        second
            .connection
            .send(StreamEvent::Error {
                id: None,
                code: "test".to_string(),
                message: "hello".to_string(),
            })
            .await;
        let event = second.rx.recv().await.expect("event");
        assert_eq!(event.event_name(), "error");
    }

    #[tokio::test]
    async fn test_binds_at_most_one_session() {
        let registry = ConnectionRegistry::new();
        let opened = registry.open(None).await;
        opened.connection.bind_session("s1");
        opened.connection.bind_session("s2");
        assert_eq!(opened.connection.bound_session().as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_close_hooks_fire_once_across_both_initiators() {
        let registry = ConnectionRegistry::new();
        let opened = registry.open(None).await;
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        opened.connection.close_hooks.push(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        // Client disconnect and explicit close racing each other.
        opened.connection.close_hooks.fire();
        opened.connection.close_hooks.fire();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_to_detached_stream_is_best_effort() {
        let registry = ConnectionRegistry::new();
        let opened = registry.open(None).await;
        drop(opened.rx);
        // No panic, no error surfaced.
        opened
            .connection
            .send(StreamEvent::Error {
                id: None,
                code: "test".to_string(),
                message: "dropped".to_string(),
            })
            .await;
    }
}
