pub mod actor;
pub mod broadcast;
pub mod handler;

use axum::extract::ws::Message;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;

/// Sender half of a connection's bounded outbound queue.
/// The connection's writer task drains the receiver into the WebSocket sink.
pub type ConnectionSender = mpsc::Sender<Message>;

/// Identifier a client presents in the handshake path (`/{client_id}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

/// Reasons a handshake path does not yield a usable client id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("missing client id")]
    MissingClientId,

    #[error("malformed client id: {0}")]
    MalformedClientId(String),
}

impl ClientId {
    /// Parse a client id from a handshake path.
    ///
    /// Leading and trailing slashes are stripped, so `/alice/` yields `alice`.
    /// Empty ids, ids with an interior `/`, ids with control characters and
    /// ids longer than `max_len` bytes are rejected.
    pub fn from_path(path: &str, max_len: usize) -> Result<Self, HandshakeError> {
        let id = path.trim_matches('/');
        if id.is_empty() {
            return Err(HandshakeError::MissingClientId);
        }
        if id.len() > max_len {
            return Err(HandshakeError::MalformedClientId(format!(
                "longer than {} bytes",
                max_len
            )));
        }
        if id.contains('/') {
            return Err(HandshakeError::MalformedClientId(
                "contains a path separator".to_string(),
            ));
        }
        if id.chars().any(char::is_control) {
            return Err(HandshakeError::MalformedClientId(
                "contains control characters".to_string(),
            ));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered client: its id plus the handle used to queue outbound frames.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ClientId,
    sender: ConnectionSender,
}

impl Connection {
    pub fn new(id: ClientId, sender: ConnectionSender) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn sender(&self) -> &ConnectionSender {
        &self.sender
    }
}

/// Returned when a client id already has a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("client id {0} is already connected")]
pub struct AlreadyRegistered(pub ClientId);

/// Registry of live connections, keyed by client id.
///
/// At most one entry exists per id. The map sits behind a single lock so that
/// a snapshot observes every concurrent register/unregister either fully
/// before or fully after it. Sends never happen while the lock is held.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ClientId, Connection>>,
}

/// Shared handle to the registry, cloned into every connection task.
pub type SharedRegistry = Arc<ConnectionRegistry>;

/// Create a new empty connection registry.
pub fn new_connection_registry() -> SharedRegistry {
    Arc::new(ConnectionRegistry::default())
}

impl ConnectionRegistry {
    /// Insert a connection. Fails without touching the existing entry if the
    /// id is already present.
    pub fn register(&self, id: ClientId, conn: Connection) -> Result<(), AlreadyRegistered> {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if connections.contains_key(&id) {
            return Err(AlreadyRegistered(id));
        }
        connections.insert(id.clone(), conn);
        let count = connections.len();
        drop(connections);

        tracing::debug!(client_id = %id, connections = count, "Connection registered");
        Ok(())
    }

    /// Remove a connection. Removing an absent id is a no-op.
    pub fn unregister(&self, id: &ClientId) {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();

        if removed {
            tracing::debug!(client_id = %id, "Connection unregistered");
        }
    }

    /// Point-in-time copy of every connection except `exclude`.
    pub fn snapshot_excluding(&self, exclude: &ClientId) -> Vec<Connection> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| *id != exclude)
            .map(|(_, conn)| conn.clone())
            .collect()
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted list of the ids currently registered.
    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Drop every entry. Called once the server has stopped accepting.
    pub fn clear(&self) {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn id(s: &str) -> ClientId {
        ClientId::from_path(s, 128).unwrap()
    }

    fn conn(name: &str) -> (Connection, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(8);
        (Connection::new(id(name), tx), rx)
    }

    #[test]
    fn test_client_id_strips_slashes() {
        assert_eq!(id("/alice").as_str(), "alice");
        assert_eq!(id("/alice/").as_str(), "alice");
        assert_eq!(id("bob").as_str(), "bob");
    }

    #[test]
    fn test_client_id_rejects_empty() {
        assert_eq!(
            ClientId::from_path("/", 128),
            Err(HandshakeError::MissingClientId)
        );
        assert_eq!(
            ClientId::from_path("", 128),
            Err(HandshakeError::MissingClientId)
        );
        assert_eq!(
            ClientId::from_path("///", 128),
            Err(HandshakeError::MissingClientId)
        );
    }

    #[test]
    fn test_client_id_rejects_malformed() {
        assert!(matches!(
            ClientId::from_path("/a/b", 128),
            Err(HandshakeError::MalformedClientId(_))
        ));
        assert!(matches!(
            ClientId::from_path("bad\nid", 128),
            Err(HandshakeError::MalformedClientId(_))
        ));
        assert!(matches!(
            ClientId::from_path(&"x".repeat(9), 8),
            Err(HandshakeError::MalformedClientId(_))
        ));
    }

    #[test]
    fn test_register_and_snapshot() {
        let registry = ConnectionRegistry::default();
        let (alice, _rx_a) = conn("alice");
        let (bob, _rx_b) = conn("bob");

        registry.register(id("alice"), alice).unwrap();
        registry.register(id("bob"), bob).unwrap();

        assert_eq!(registry.len(), 2);
        let snapshot = registry.snapshot_excluding(&id("alice"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), &id("bob"));
    }

    #[test]
    fn test_duplicate_register_keeps_existing_entry() {
        let registry = ConnectionRegistry::default();
        let (first, _rx1) = conn("alice");
        let (second, _rx2) = conn("alice");

        registry.register(id("alice"), first.clone()).unwrap();
        let err = registry.register(id("alice"), second).unwrap_err();
        assert_eq!(err, AlreadyRegistered(id("alice")));

        let snapshot = registry.snapshot_excluding(&id("nobody"));
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].sender().same_channel(first.sender()));
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let registry = ConnectionRegistry::default();
        let (alice, _rx) = conn("alice");
        registry.register(id("alice"), alice).unwrap();

        registry.unregister(&id("bob"));
        assert_eq!(registry.client_ids(), vec![id("alice")]);

        registry.unregister(&id("alice"));
        registry.unregister(&id("alice"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear() {
        let registry = ConnectionRegistry::default();
        let (alice, _rx) = conn("alice");
        registry.register(id("alice"), alice).unwrap();
        registry.clear();
        assert!(!registry.contains(&id("alice")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_unregister() {
        let registry = new_connection_registry();
        let mut handles = Vec::new();

        // 32 tasks fight over 4 ids; each task loops register/snapshot/unregister.
        for task in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let name = format!("client-{}", task % 4);
                let me = id(&name);
                let mut wins = 0;
                for _ in 0..200 {
                    let (tx, _rx) = mpsc::channel(1);
                    if registry.register(me.clone(), Connection::new(me.clone(), tx)).is_ok() {
                        wins += 1;
                        let snapshot = registry.snapshot_excluding(&me);
                        assert!(snapshot.iter().all(|c| c.id() != &me));
                        let unique: HashSet<_> = snapshot.iter().map(|c| c.id().clone()).collect();
                        assert_eq!(unique.len(), snapshot.len());
                        registry.unregister(&me);
                    }
                    tokio::task::yield_now().await;
                }
                wins
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert!(total > 0);
        assert!(registry.is_empty());
    }
}
