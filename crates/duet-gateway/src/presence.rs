use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use duet_types::events::ServerEvent;

/// What a connection's send task can be asked to do.
#[derive(Debug)]
pub enum Outbound {
    Event(ServerEvent),
    /// Close the transport with this reason (the user connected elsewhere).
    Close(String),
}

/// Addressable end of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh connection id. Returns the receiving end
    /// for the connection's send task.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                conn_id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue an event. Returns false if the connection is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(Outbound::Event(event)).is_ok()
    }

    pub fn close(&self, reason: impl Into<String>) {
        if self.tx.send(Outbound::Close(reason.into())).is_err() {
            debug!("Connection {} already gone, close not sent", self.conn_id);
        }
    }
}

/// Which users are connected and how to reach them. At most one entry per
/// username; the map itself is never handed out.
#[derive(Clone, Default)]
pub struct PresenceDirectory {
    inner: Arc<RwLock<HashMap<String, ConnectionHandle>>>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` for `username`. Returns the handle it replaced, if any.
    pub async fn set_online(&self, username: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.inner
            .write()
            .await
            .insert(username.to_string(), handle)
    }

    /// Remove the entry, but only if `conn_id` still owns it.
    /// Returns whether an entry was removed.
    pub async fn set_offline(&self, username: &str, conn_id: Uuid) -> bool {
        let mut entries = self.inner.write().await;
        let owned = entries.get(username).is_some_and(|h| h.id() == conn_id);

        // Otherwise a newer connection has taken over — don't touch anything
        if owned {
            entries.remove(username);
        }
        owned
    }

    pub async fn is_online(&self, username: &str) -> bool {
        self.inner.read().await.contains_key(username)
    }

    pub async fn connection_for(&self, username: &str) -> Option<ConnectionHandle> {
        self.inner.read().await.get(username).cloned()
    }

    /// Send a targeted event to a user. Returns false if they are offline.
    pub async fn send_to(&self, username: &str, event: ServerEvent) -> bool {
        let entries = self.inner.read().await;
        match entries.get(username) {
            Some(handle) => handle.send(event),
            None => false,
        }
    }

    /// Number of connected users.
    pub async fn online_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
