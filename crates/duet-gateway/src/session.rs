use uuid::Uuid;

use duet_types::events::ServerEvent;

use crate::presence::ConnectionHandle;

/// One authenticated identity bound to one live connection.
///
/// The username is fixed when the session is created from a verified token;
/// the router reads "who is asking" from here, never from a payload.
#[derive(Debug, Clone)]
pub struct Session {
    username: String,
    handle: ConnectionHandle,
}

impl Session {
    pub(crate) fn new(username: String, handle: ConnectionHandle) -> Self {
        Self { username, handle }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn conn_id(&self) -> Uuid {
        self.handle.id()
    }

    /// Reply on this session's own connection, even if it has been replaced
    /// in the presence directory.
    pub fn reply(&self, event: ServerEvent) {
        if !self.handle.send(event) {
            tracing::debug!("{} ({}) reply dropped, connection gone", self.username, self.conn_id());
        }
    }
}
