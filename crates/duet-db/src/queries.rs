use crate::Database;
use crate::models::{MessageRow, UserRow, format_timestamp};
use anyhow::{Result, bail};
use rusqlite::{Connection, ErrorCode};

use duet_types::models::{ChatMessage, RelationshipStatus, SearchResult, UserProfile};

impl Database {
    // -- Users --

    /// Insert a new user. Returns false if the username is already taken.
    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        nickname: &str,
        avatar: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password_hash, nickname, avatar) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![username, password_hash, nickname, avatar],
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, username))
    }

    pub fn update_avatar(&self, username: &str, avatar_url: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET avatar = ?1 WHERE username = ?2",
                (avatar_url, username),
            )?;
            Ok(())
        })
    }

    /// Users whose name starts with `prefix` (case-sensitive), excluding
    /// `current_user`, annotated with their relationship to `current_user`.
    pub fn search_by_prefix(&self, prefix: &str, current_user: &str) -> Result<Vec<SearchResult>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.username, u.nickname, u.avatar, f.status
                 FROM users u
                 LEFT JOIN friendships f ON
                     (f.user1_username = u.username AND f.user2_username = ?1) OR
                     (f.user2_username = u.username AND f.user1_username = ?1)
                 WHERE substr(u.username, 1, length(?2)) = ?2 AND u.username != ?1
                 ORDER BY u.username",
            )?;

            let rows = stmt
                .query_map((current_user, prefix), |row| {
                    let status: Option<String> = row.get(3)?;
                    Ok(SearchResult {
                        profile: UserProfile {
                            username: row.get(0)?,
                            nickname: row.get(1)?,
                            avatar: row.get(2)?,
                        },
                        friendship_status: match status.as_deref() {
                            Some("accepted") => RelationshipStatus::Accepted,
                            Some(_) => RelationshipStatus::Pending,
                            None => RelationshipStatus::NotFriends,
                        },
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    /// Persist a `text` or `file` message. Returns the row id.
    pub fn save_message(&self, msg: &ChatMessage) -> Result<i64> {
        if !msg.kind.is_persisted() {
            bail!("message type '{}' is not persisted", msg.kind.as_str());
        }

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_username, recipient_username, content, message_type, file_url, filename, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.sender_username,
                    msg.recipient_username,
                    msg.content,
                    msg.kind.as_str(),
                    msg.url,
                    msg.filename,
                    format_timestamp(&msg.timestamp),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All messages between two users, oldest first.
    pub fn get_history(&self, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_history(conn, user_a, user_b))
    }
}

fn query_user(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT username, password_hash, nickname, avatar, created_at FROM users WHERE username = ?1",
    )?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                username: row.get(0)?,
                password_hash: row.get(1)?,
                nickname: row.get(2)?,
                avatar: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_history(conn: &Connection, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
    // JOIN users so history always shows the sender's current profile
    let mut stmt = conn.prepare(
        "SELECT m.id, m.sender_username, m.recipient_username, m.content, m.message_type,
                m.file_url, m.filename, m.timestamp, u.nickname, u.avatar
         FROM messages m
         JOIN users u ON m.sender_username = u.username
         WHERE (m.sender_username = ?1 AND m.recipient_username = ?2)
            OR (m.sender_username = ?2 AND m.recipient_username = ?1)
         ORDER BY m.timestamp ASC, m.id ASC",
    )?;

    let rows = stmt
        .query_map((user_a, user_b), |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                sender_username: row.get(1)?,
                recipient_username: row.get(2)?,
                content: row.get(3)?,
                message_type: row.get(4)?,
                file_url: row.get(5)?,
                filename: row.get(6)?,
                timestamp: row.get(7)?,
                sender_nickname: row.get(8)?,
                sender_avatar: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use duet_types::models::MessageKind;

    fn db_with_users(names: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for name in names {
            assert!(db.create_user(name, "hash", &name.to_uppercase(), None).unwrap());
        }
        db
    }

    fn text(from: &str, to: &str, body: &str, at: chrono::DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            sender_username: from.into(),
            recipient_username: to.into(),
            kind: MessageKind::Text,
            content: Some(body.into()),
            url: None,
            filename: None,
            timestamp: at,
            temp_id: None,
        }
    }

    #[test]
    fn duplicate_username_is_refused() {
        let db = db_with_users(&["alice"]);
        assert!(!db.create_user("alice", "other", "Imposter", None).unwrap());
        assert_eq!(db.get_user("alice").unwrap().unwrap().nickname, "ALICE");
        assert!(db.get_user("nobody").unwrap().is_none());
    }

    #[test]
    fn avatar_update_is_visible() {
        let db = db_with_users(&["alice"]);
        db.update_avatar("alice", "/uploads/a.png").unwrap();
        let user = db.get_user("alice").unwrap().unwrap();
        assert_eq!(user.avatar.as_deref(), Some("/uploads/a.png"));
    }

    #[test]
    fn history_is_ordered_across_interleaved_pairs() {
        let db = db_with_users(&["alice", "bob", "carol"]);
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let at = |n: i64| t0 + Duration::microseconds(n);

        // Inserted out of order, interleaved with another pair
        db.save_message(&text("bob", "alice", "third", at(3))).unwrap();
        db.save_message(&text("alice", "carol", "noise", at(2))).unwrap();
        db.save_message(&text("alice", "bob", "first", at(1))).unwrap();
        db.save_message(&text("carol", "alice", "noise", at(4))).unwrap();
        db.save_message(&text("alice", "bob", "second", at(2))).unwrap();

        let history: Vec<String> = db
            .get_history("bob", "alice")
            .unwrap()
            .into_iter()
            .map(|row| row.content.unwrap())
            .collect();
        assert_eq!(history, vec!["first", "second", "third"]);
    }

    #[test]
    fn history_joins_current_sender_profile() {
        let db = db_with_users(&["alice", "bob"]);
        db.save_message(&text("alice", "bob", "hi", Utc::now())).unwrap();
        db.update_avatar("alice", "/uploads/new.png").unwrap();

        let entry = db.get_history("alice", "bob").unwrap().remove(0).into_history_entry();
        assert_eq!(entry.sender_nickname, "ALICE");
        assert_eq!(entry.sender_avatar.as_deref(), Some("/uploads/new.png"));
        assert_eq!(entry.message.content.as_deref(), Some("hi"));
    }

    #[test]
    fn transient_messages_are_not_stored() {
        let db = db_with_users(&["alice", "bob"]);
        let mut msg = text("alice", "bob", "x", Utc::now());
        msg.kind = MessageKind::FileUploading;
        assert!(db.save_message(&msg).is_err());
        assert!(db.get_history("alice", "bob").unwrap().is_empty());
    }

    #[test]
    fn search_annotates_relationship_and_excludes_self() {
        let db = db_with_users(&["user1", "user2", "user3", "user4", "other"]);
        db.add_friend_request("user1", "user2").unwrap();
        db.respond_to_request("user2", "user1", true).unwrap();
        db.add_friend_request("user3", "user1").unwrap();

        let results = db.search_by_prefix("us", "user1").unwrap();
        let statuses: Vec<(&str, RelationshipStatus)> = results
            .iter()
            .map(|r| (r.profile.username.as_str(), r.friendship_status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("user2", RelationshipStatus::Accepted),
                ("user3", RelationshipStatus::Pending),
                ("user4", RelationshipStatus::NotFriends),
            ]
        );
    }

    #[test]
    fn search_prefix_is_literal() {
        let db = db_with_users(&["a_b", "axb"]);
        let results = db.search_by_prefix("a_", "nobody").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].profile.username, "a_b");
    }
}
