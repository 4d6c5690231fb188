use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub nickname: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// A friend as shown in the initial snapshot, annotated with live presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEntry {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub status: PresenceStatus,
}

/// Relationship between the searching user and a search hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Accepted,
    Pending,
    NotFriends,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub friendship_status: RelationshipStatus,
}

/// Kind of a chat message. `FileUploading` and `FileUploadCancelled` are
/// progress markers that are routed live and never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    File,
    FileUploading,
    FileUploadCancelled,
}

impl MessageKind {
    pub fn is_persisted(self) -> bool {
        matches!(self, Self::Text | Self::File)
    }

    /// Whether the sender gets its own message echoed back.
    pub fn echoes_to_sender(self) -> bool {
        !matches!(self, Self::FileUploadCancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
            Self::FileUploading => "file_uploading",
            Self::FileUploadCancelled => "file_upload_cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "file" => Some(Self::File),
            "file_uploading" => Some(Self::FileUploading),
            "file_upload_cancelled" => Some(Self::FileUploadCancelled),
            _ => None,
        }
    }
}

/// A message as delivered over the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_username: String,
    pub recipient_username: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

/// A stored message joined with the sender's current profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    #[serde(flatten)]
    pub message: ChatMessage,
    pub sender_nickname: String,
    pub sender_avatar: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_text_and_file_are_persisted() {
        assert!(MessageKind::Text.is_persisted());
        assert!(MessageKind::File.is_persisted());
        assert!(!MessageKind::FileUploading.is_persisted());
        assert!(!MessageKind::FileUploadCancelled.is_persisted());
    }

    #[test]
    fn cancellation_is_not_echoed() {
        assert!(MessageKind::FileUploading.echoes_to_sender());
        assert!(!MessageKind::FileUploadCancelled.echoes_to_sender());
    }

    #[test]
    fn kind_names_match_wire_format() {
        for kind in [
            MessageKind::Text,
            MessageKind::File,
            MessageKind::FileUploading,
            MessageKind::FileUploadCancelled,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.as_str().to_string()));
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::parse("voice"), None);
    }

    #[test]
    fn search_result_flattens_profile() {
        let hit = SearchResult {
            profile: UserProfile {
                username: "bob".into(),
                nickname: "Bob".into(),
                avatar: None,
            },
            friendship_status: RelationshipStatus::NotFriends,
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["username"], "bob");
        assert_eq!(json["friendship_status"], "not_friends");
    }
}
