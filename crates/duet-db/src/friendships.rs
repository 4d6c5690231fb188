//! Friendship state machine over canonical unordered pairs.
//!
//! `none -> pending -> accepted`, or `pending -> none` on rejection. A pair
//! has at most one row regardless of who asked whom.

use anyhow::Result;
use rusqlite::Connection;
use thiserror::Error;

use duet_types::models::UserProfile;

use crate::Database;
use crate::queries::OptionalExt;

/// Two usernames ordered so that `low() < high()`. Used as the storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FriendPair {
    low: String,
    high: String,
}

impl FriendPair {
    pub fn new(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low: low.to_string(),
            high: high.to_string(),
        }
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

impl FriendshipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }
}

/// Why a friend request was refused. The display text is shown to the user.
#[derive(Debug, Error)]
pub enum FriendshipError {
    #[error("you cannot add yourself as a friend")]
    SelfRequest,

    #[error("already friends or a request is already pending")]
    AlreadyExists,

    #[error("user {0} does not exist")]
    UnknownUser(String),

    #[error("store failure: {0}")]
    Store(#[from] anyhow::Error),
}

impl Database {
    /// Create a pending request from `from` to `to`.
    pub fn add_friend_request(&self, from: &str, to: &str) -> Result<(), FriendshipError> {
        if from == to {
            return Err(FriendshipError::SelfRequest);
        }
        let pair = FriendPair::new(from, to);

        // Existence check and insert share one transaction under the DB lock
        let outcome = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let target: Option<String> = tx
                .query_row("SELECT username FROM users WHERE username = ?1", [to], |row| row.get(0))
                .optional()?;
            if target.is_none() {
                return Ok(Err(FriendshipError::UnknownUser(to.to_string())));
            }

            if query_status(&tx, &pair)?.is_some() {
                return Ok(Err(FriendshipError::AlreadyExists));
            }

            tx.execute(
                "INSERT INTO friendships (user1_username, user2_username, status, action_user)
                 VALUES (?1, ?2, ?3, ?4)",
                (pair.low(), pair.high(), FriendshipStatus::Pending.as_str(), from),
            )?;
            tx.commit()?;
            Ok(Ok(()))
        })?;

        outcome
    }

    /// Accept or reject `requester`'s request. Accepting only touches a
    /// pending row that `requester` created; rejecting deletes whatever row
    /// the pair has. Returns whether a row changed.
    pub fn respond_to_request(&self, responder: &str, requester: &str, accept: bool) -> Result<bool> {
        let pair = FriendPair::new(responder, requester);

        self.with_conn_mut(|conn| {
            let changed = if accept {
                conn.execute(
                    "UPDATE friendships SET status = 'accepted', action_user = ?1
                     WHERE user1_username = ?2 AND user2_username = ?3
                       AND status = 'pending' AND action_user = ?4",
                    (responder, pair.low(), pair.high(), requester),
                )?
            } else {
                conn.execute(
                    "DELETE FROM friendships WHERE user1_username = ?1 AND user2_username = ?2",
                    (pair.low(), pair.high()),
                )?
            };
            Ok(changed > 0)
        })
    }

    /// Insert an accepted friendship directly, ignoring existing rows.
    /// Used for demo seeding.
    pub fn add_accepted_friendship(&self, a: &str, b: &str) -> Result<()> {
        let pair = FriendPair::new(a, b);

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO friendships (user1_username, user2_username, status, action_user)
                 VALUES (?1, ?2, 'accepted', 'system')",
                (pair.low(), pair.high()),
            )?;
            Ok(())
        })
    }

    pub fn are_friends(&self, a: &str, b: &str) -> Result<bool> {
        let pair = FriendPair::new(a, b);
        self.with_conn(|conn| Ok(query_status(conn, &pair)? == Some(FriendshipStatus::Accepted)))
    }

    pub fn friendship_status(&self, a: &str, b: &str) -> Result<Option<FriendshipStatus>> {
        let pair = FriendPair::new(a, b);
        self.with_conn(|conn| query_status(conn, &pair))
    }

    /// Accepted friends of `username`, as the other party's public profile.
    pub fn get_friends(&self, username: &str) -> Result<Vec<UserProfile>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.username, u.nickname, u.avatar
                 FROM friendships f
                 JOIN users u ON u.username = CASE WHEN f.user1_username = ?1
                                                   THEN f.user2_username
                                                   ELSE f.user1_username END
                 WHERE (f.user1_username = ?1 OR f.user2_username = ?1) AND f.status = 'accepted'
                 ORDER BY u.username",
            )?;
            collect_profiles(&mut stmt, username)
        })
    }

    /// Incoming pending requests for `username`: the requester's profile.
    /// The user's own outgoing requests are not included.
    pub fn get_pending_requests(&self, username: &str) -> Result<Vec<UserProfile>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.username, u.nickname, u.avatar
                 FROM friendships f
                 JOIN users u ON u.username = f.action_user
                 WHERE (f.user1_username = ?1 OR f.user2_username = ?1)
                   AND f.status = 'pending' AND f.action_user != ?1
                 ORDER BY u.username",
            )?;
            collect_profiles(&mut stmt, username)
        })
    }
}

fn query_status(conn: &Connection, pair: &FriendPair) -> Result<Option<FriendshipStatus>> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM friendships WHERE user1_username = ?1 AND user2_username = ?2",
            (pair.low(), pair.high()),
            |row| row.get(0),
        )
        .optional()?;

    Ok(status.map(|s| match s.as_str() {
        "accepted" => FriendshipStatus::Accepted,
        _ => FriendshipStatus::Pending,
    }))
}

fn collect_profiles(stmt: &mut rusqlite::Statement<'_>, username: &str) -> Result<Vec<UserProfile>> {
    let rows = stmt
        .query_map([username], |row| {
            Ok(UserProfile {
                username: row.get(0)?,
                nickname: row.get(1)?,
                avatar: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
