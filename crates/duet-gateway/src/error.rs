use thiserror::Error;

/// Reasons an inbound event was not carried out.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Sender and recipient are not friends. Dropped without telling the
    /// client, so a probing client learns nothing about the relationship.
    #[error("{sender} is not friends with {recipient}")]
    NotFriends { sender: String, recipient: String },

    /// Required payload field missing or empty.
    #[error("malformed event: {0}")]
    Malformed(&'static str),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RouterError {
    /// Whether the caller should be left without any reply.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::NotFriends { .. } | Self::Malformed(_))
    }
}
