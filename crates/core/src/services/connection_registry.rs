//! In-memory registry of live connections.
//!
//! Maps a user id to every live channel that user currently has open.
//! The registry is process-local and never a source of truth for history:
//! a user absent from it simply misses the live push and catches up on the
//! next history fetch.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;
use uuid::Uuid;

/// Identifier of one live connection.
pub type ConnectionId = Uuid;

/// Why an event could not be queued on a connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    /// The connection's writer has gone away.
    #[error("connection closed")]
    Closed,
    /// The connection's outbound queue is full.
    #[error("connection queue full")]
    Full,
}

/// One open live channel belonging to a user.
#[derive(Debug, Clone)]
pub struct LiveConnection {
    /// Connection id, unique for the process lifetime.
    pub id: ConnectionId,
    /// Owning user.
    pub user_id: String,
    sender: mpsc::Sender<Arc<str>>,
    shutdown: CancellationToken,
}

impl LiveConnection {
    /// Wrap the sending half of a connection's outbound queue.
    #[must_use]
    pub fn new(user_id: impl Into<String>, sender: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            sender,
            shutdown: CancellationToken::new(),
        }
    }

    /// Queue a serialized event without waiting.
    pub fn push(&self, event: Arc<str>) -> Result<(), PushError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
            mpsc::error::TrySendError::Full(_) => PushError::Full,
        })
    }

    /// Whether the receiving side has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Ask the socket task owning this connection to close the channel.
    ///
    /// Shared by every clone of the connection.
    pub fn shut_down(&self) {
        self.shutdown.cancel();
    }

    /// Whether [`shut_down`](Self::shut_down) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once the connection has been shut down.
    pub fn shutdown_requested(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }
}

/// Shared `user id -> live connections` map.
///
/// Cloning is cheap and every clone sees the same map.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<String, Vec<LiveConnection>>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection for a user. Existing connections are kept.
    pub async fn register(&self, user_id: &str, connection: LiveConnection) {
        let connection_id = connection.id;
        let mut connections = self.connections.write().await;
        let entry = connections.entry(user_id.to_string()).or_default();
        entry.push(connection);

        debug!(
            user_id = %user_id,
            connection_id = %connection_id,
            open = entry.len(),
            "Live connection registered"
        );
    }

    /// Create a connection with a bounded outbound queue and register it.
    pub async fn open(
        &self,
        user_id: &str,
        buffer: usize,
    ) -> (LiveConnection, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let connection = LiveConnection::new(user_id, tx);
        self.register(user_id, connection.clone()).await;
        (connection, rx)
    }

    /// Remove exactly one connection.
    ///
    /// Returns `false` if it was not registered, so calling this twice for
    /// the same connection is harmless.
    pub async fn unregister(&self, user_id: &str, connection_id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;

        let Some(entry) = connections.get_mut(user_id) else {
            return false;
        };

        let before = entry.len();
        entry.retain(|c| c.id != connection_id);
        let removed = entry.len() != before;

        if entry.is_empty() {
            connections.remove(user_id);
        }

        if removed {
            debug!(user_id = %user_id, connection_id = %connection_id, "Live connection unregistered");
        }

        removed
    }

    /// Snapshot of a user's current connections.
    pub async fn connections_for(&self, user_id: &str) -> Vec<LiveConnection> {
        self.connections
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a user has at least one open connection.
    pub async fn is_connected(&self, user_id: &str) -> bool {
        self.connections.read().await.contains_key(user_id)
    }

    /// Total number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.values().map(Vec::len).sum()
    }

    /// Number of users with at least one open connection.
    pub async fn user_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
