use anyhow::Result;
use tracing::info;

use duet_api::auth::{default_avatar, hash_password};
use duet_db::Database;

/// Demo accounts: (username, password, nickname).
const DEMO_USERS: &[(&str, &str, &str)] = &[
    ("user1", "pass123", "Alice"),
    ("user2", "pass123", "Bob"),
    ("user3", "pass123", "Charlie"),
    ("user4", "pass123", "Diana"),
];

/// Create the demo accounts and make every pair of them friends.
/// Safe to run on every start.
pub fn seed_demo(db: &Database) -> Result<()> {
    let mut created = 0;
    for (username, password, nickname) in DEMO_USERS {
        if db.get_user(username)?.is_some() {
            continue;
        }
        let hash = hash_password(password)?;
        if db.create_user(username, &hash, nickname, Some(default_avatar(username).as_str()))? {
            created += 1;
        }
    }

    for (i, (a, _, _)) in DEMO_USERS.iter().enumerate() {
        for (b, _, _) in &DEMO_USERS[i + 1..] {
            db.add_accepted_friendship(a, b)?;
        }
    }

    info!("Demo seed complete ({} new users)", created);
    Ok(())
}
