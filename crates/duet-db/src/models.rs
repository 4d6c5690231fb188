//! Database row types — these map directly to SQLite rows.
//! Conversions into duet-types models live next to them.

use chrono::{DateTime, Utc};
use tracing::warn;

use duet_types::models::{ChatMessage, HistoryEntry, MessageKind, UserProfile};

pub struct UserRow {
    pub username: String,
    pub password_hash: String,
    pub nickname: String,
    pub avatar: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            username: self.username.clone(),
            nickname: self.nickname.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// A stored message joined with its sender's current nickname and avatar.
pub struct MessageRow {
    pub id: i64,
    pub sender_username: String,
    pub recipient_username: String,
    pub content: Option<String>,
    pub message_type: String,
    pub file_url: Option<String>,
    pub filename: Option<String>,
    pub timestamp: String,
    pub sender_nickname: String,
    pub sender_avatar: Option<String>,
}

impl MessageRow {
    pub fn into_history_entry(self) -> HistoryEntry {
        let kind = MessageKind::parse(&self.message_type).unwrap_or_else(|| {
            warn!("Corrupt message_type '{}' on message {}", self.message_type, self.id);
            MessageKind::Text
        });
        let timestamp = parse_timestamp(&self.timestamp).unwrap_or_else(|| {
            warn!("Corrupt timestamp '{}' on message {}", self.timestamp, self.id);
            DateTime::default()
        });

        HistoryEntry {
            id: self.id,
            message: ChatMessage {
                sender_username: self.sender_username,
                recipient_username: self.recipient_username,
                kind,
                content: self.content,
                url: self.file_url,
                filename: self.filename,
                timestamp,
                temp_id: None,
            },
            sender_nickname: self.sender_nickname,
            sender_avatar: self.sender_avatar,
        }
    }
}

/// Fixed-width RFC 3339 with microseconds, so text order equals time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
