use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            username        TEXT PRIMARY KEY,
            password_hash   TEXT NOT NULL,
            nickname        TEXT NOT NULL,
            avatar          TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_username     TEXT NOT NULL REFERENCES users(username),
            recipient_username  TEXT NOT NULL REFERENCES users(username),
            content             TEXT,
            message_type        TEXT NOT NULL CHECK (message_type IN ('text', 'file')),
            file_url            TEXT,
            filename            TEXT,
            timestamp           TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_username, recipient_username, timestamp);

        -- One row per unordered pair: user1 is always the smaller name.
        CREATE TABLE IF NOT EXISTS friendships (
            user1_username  TEXT NOT NULL REFERENCES users(username),
            user2_username  TEXT NOT NULL REFERENCES users(username),
            status          TEXT NOT NULL CHECK (status IN ('pending', 'accepted')),
            action_user     TEXT NOT NULL,
            PRIMARY KEY (user1_username, user2_username),
            CHECK (user1_username < user2_username)
        );

        CREATE INDEX IF NOT EXISTS idx_friendships_user2
            ON friendships(user2_username);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
