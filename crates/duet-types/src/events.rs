use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, FriendEntry, HistoryEntry, PresenceStatus, SearchResult, UserProfile};

/// Events sent FROM server TO client over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Server confirms the session is bound to this identity
    Ready { username: String },

    /// Snapshot requested by the client after connecting
    InitialDataResponse {
        current_user: UserProfile,
        friends: Vec<FriendEntry>,
        pending_requests: Vec<UserProfile>,
    },

    /// A message addressed to this user, or the echo of one it sent
    ReceiveMessage(ChatMessage),

    ChatHistoryResponse {
        contact: String,
        history: Vec<HistoryEntry>,
    },

    SearchResults(Vec<SearchResult>),

    /// Outcome of this user's own friend request
    FriendRequestSent { success: bool, message: String },

    /// Someone sent this user a friend request
    NewFriendRequest(UserProfile),

    /// Friend lists changed; the client should fetch a fresh snapshot
    ReloadData,

    /// A friend came online or went offline
    StatusChange {
        username: String,
        status: PresenceStatus,
    },

    /// A friend changed their avatar
    AvatarUpdated {
        username: String,
        new_avatar_url: String,
    },

    /// The request could not be served
    Error { message: String },
}

/// Commands sent FROM client TO server over the WebSocket gateway.
/// None of them carry the caller's identity; it comes from the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    GetInitialData,

    SendMessage(OutgoingMessage),

    LoadChatHistory { contact_username: String },

    SearchUser { query: String },

    SendFriendRequest { username: String },

    RespondToFriendRequest { username: String, accept: bool },
}

/// Client-side payload of `send_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub recipient_username: String,
    #[serde(rename = "type", default)]
    pub kind: crate::models::MessageKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub temp_id: Option<String>,
}
