use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use duet_db::{Database, FriendshipError};
use duet_types::events::{ClientCommand, OutgoingMessage, ServerEvent};
use duet_types::models::{ChatMessage, FriendEntry, MessageKind, PresenceStatus};

use crate::clock::MessageClock;
use crate::error::RouterError;
use crate::presence::{ConnectionHandle, Outbound, PresenceDirectory};
use crate::session::Session;

/// Reply text when a request fails for reasons the client cannot fix.
const GENERIC_FAILURE: &str = "request failed, please try again";

/// Routes inbound session events: checks friendship, persists, and forwards
/// to the right connections. Holds no state of its own beyond the presence
/// directory and the message clock.
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    db: Arc<Database>,
    presence: PresenceDirectory,
    clock: MessageClock,
    /// Held from a presence change until its status broadcast is queued, so
    /// friends see transitions in the same order the directory applied them.
    transitions: Mutex<()>,
}

impl EventRouter {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                db,
                presence: PresenceDirectory::new(),
                clock: MessageClock::new(),
                transitions: Mutex::new(()),
            }),
        }
    }

    pub fn presence(&self) -> &PresenceDirectory {
        &self.inner.presence
    }

    /// Run a blocking store call off the async runtime.
    async fn store<F, T>(&self, f: F) -> Result<T, RouterError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.inner.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(db.as_ref())).await??)
    }

    // -- Session lifecycle --

    /// Bind a new connection to `username` and announce it to online friends.
    /// A previous connection for the same user is told to close; friends are
    /// not re-notified in that case since the user never went offline.
    pub async fn connect(&self, username: &str) -> (Session, mpsc::UnboundedReceiver<Outbound>) {
        let (handle, rx) = ConnectionHandle::new();
        let session = Session::new(username.to_string(), handle.clone());

        session.reply(ServerEvent::Ready {
            username: username.to_string(),
        });

        let _transition = self.inner.transitions.lock().await;
        match self.inner.presence.set_online(username, handle).await {
            Some(previous) => {
                info!(
                    "{} reconnected ({}), evicting connection {}",
                    username,
                    session.conn_id(),
                    previous.id()
                );
                previous.close("signed in from another connection");
            }
            None => {
                let event = ServerEvent::StatusChange {
                    username: username.to_string(),
                    status: PresenceStatus::Online,
                };
                if let Err(e) = self.notify_friends(username, event).await {
                    error!("{} online notification failed: {}", username, e);
                    session.reply(ServerEvent::Error {
                        message: GENERIC_FAILURE.to_string(),
                    });
                }
            }
        }

        (session, rx)
    }

    /// Tear down a session. Friends are told only if this session still
    /// owned the user's presence entry.
    pub async fn disconnect(&self, session: &Session) {
        let username = session.username();
        let _transition = self.inner.transitions.lock().await;
        if !self.inner.presence.set_offline(username, session.conn_id()).await {
            debug!("{} ({}) was already replaced", username, session.conn_id());
            return;
        }

        let event = ServerEvent::StatusChange {
            username: username.to_string(),
            status: PresenceStatus::Offline,
        };
        if let Err(e) = self.notify_friends(username, event).await {
            error!("{} offline notification failed: {}", username, e);
        }
    }

    // -- Inbound events --

    /// Handle one command and deal with the outcome. Authorization and
    /// validation failures are dropped; store failures get a generic reply.
    pub async fn dispatch(&self, session: &Session, cmd: ClientCommand) {
        if let Err(e) = self.handle(session, cmd).await {
            if e.is_silent() {
                debug!("{} ({}) event dropped: {}", session.username(), session.conn_id(), e);
            } else {
                error!("{} ({}) event failed: {}", session.username(), session.conn_id(), e);
                session.reply(ServerEvent::Error {
                    message: GENERIC_FAILURE.to_string(),
                });
            }
        }
    }

    pub async fn handle(&self, session: &Session, cmd: ClientCommand) -> Result<(), RouterError> {
        match cmd {
            ClientCommand::GetInitialData => self.initial_snapshot(session).await,
            ClientCommand::SendMessage(msg) => self.send_message(session, msg).await,
            ClientCommand::LoadChatHistory { contact_username } => {
                self.load_history(session, contact_username).await
            }
            ClientCommand::SearchUser { query } => self.search_users(session, query).await,
            ClientCommand::SendFriendRequest { username } => {
                self.send_friend_request(session, username).await
            }
            ClientCommand::RespondToFriendRequest { username, accept } => {
                self.respond_to_friend_request(session, username, accept).await
            }
        }
    }

    /// Reply with the caller's profile, friends with live status, and
    /// incoming friend requests.
    pub async fn initial_snapshot(&self, session: &Session) -> Result<(), RouterError> {
        let username = session.username().to_string();
        let (user, friends, pending_requests) = self
            .store(move |db| {
                Ok((
                    db.get_user(&username)?,
                    db.get_friends(&username)?,
                    db.get_pending_requests(&username)?,
                ))
            })
            .await?;

        let Some(user) = user else {
            warn!("User '{}' from session not found in database", session.username());
            return Ok(());
        };

        let mut entries = Vec::with_capacity(friends.len());
        for profile in friends {
            let status = if self.inner.presence.is_online(&profile.username).await {
                PresenceStatus::Online
            } else {
                PresenceStatus::Offline
            };
            entries.push(FriendEntry { profile, status });
        }

        session.reply(ServerEvent::InitialDataResponse {
            current_user: user.profile(),
            friends: entries,
            pending_requests,
        });
        Ok(())
    }

    /// Route a message between friends. `text` and `file` are stored; all
    /// kinds go live to the recipient, and all but cancellations are echoed
    /// to the sender so it can reconcile `temp_id`.
    pub async fn send_message(&self, session: &Session, msg: OutgoingMessage) -> Result<(), RouterError> {
        if msg.recipient_username.is_empty() {
            return Err(RouterError::Malformed("recipient_username"));
        }
        match msg.kind {
            MessageKind::Text if msg.text.is_none() => return Err(RouterError::Malformed("text")),
            MessageKind::File if msg.url.is_none() => return Err(RouterError::Malformed("url")),
            _ => {}
        }

        let sender = session.username().to_string();
        let recipient = msg.recipient_username.clone();
        let (a, b) = (sender.clone(), recipient.clone());
        if !self.store(move |db| db.are_friends(&a, &b)).await? {
            return Err(RouterError::NotFriends { sender, recipient });
        }

        let kind = msg.kind;
        let message = ChatMessage {
            sender_username: sender,
            recipient_username: recipient,
            kind,
            content: if kind == MessageKind::Text { msg.text } else { None },
            url: if kind == MessageKind::File { msg.url } else { None },
            filename: match kind {
                MessageKind::File | MessageKind::FileUploading => msg.filename,
                _ => None,
            },
            timestamp: self.inner.clock.now(),
            temp_id: msg.temp_id,
        };

        if kind.is_persisted() {
            let stored = message.clone();
            self.store(move |db| db.save_message(&stored)).await?;
        }

        let delivered = self
            .inner
            .presence
            .send_to(&message.recipient_username, ServerEvent::ReceiveMessage(message.clone()))
            .await;
        debug!(
            "{} -> {} [{}] delivered={}",
            message.sender_username,
            message.recipient_username,
            kind.as_str(),
            delivered
        );

        if kind.echoes_to_sender() {
            session.reply(ServerEvent::ReceiveMessage(message));
        }
        Ok(())
    }

    pub async fn load_history(&self, session: &Session, contact: String) -> Result<(), RouterError> {
        if contact.is_empty() {
            return Err(RouterError::Malformed("contact_username"));
        }

        let username = session.username().to_string();
        let other = contact.clone();
        let rows = self.store(move |db| db.get_history(&username, &other)).await?;

        session.reply(ServerEvent::ChatHistoryResponse {
            contact,
            history: rows.into_iter().map(|row| row.into_history_entry()).collect(),
        });
        Ok(())
    }

    pub async fn search_users(&self, session: &Session, prefix: String) -> Result<(), RouterError> {
        if prefix.is_empty() {
            return Err(RouterError::Malformed("query"));
        }

        let username = session.username().to_string();
        let results = self.store(move |db| db.search_by_prefix(&prefix, &username)).await?;
        session.reply(ServerEvent::SearchResults(results));
        Ok(())
    }

    pub async fn send_friend_request(&self, session: &Session, to: String) -> Result<(), RouterError> {
        if to.is_empty() {
            return Err(RouterError::Malformed("username"));
        }

        let from = session.username().to_string();
        let (a, b) = (from.clone(), to.clone());
        let outcome = self.store(move |db| Ok(db.add_friend_request(&a, &b))).await?;

        match outcome {
            Ok(()) => {
                info!("{} sent a friend request to {}", from, to);
                session.reply(ServerEvent::FriendRequestSent {
                    success: true,
                    message: "friend request sent".to_string(),
                });

                if self.inner.presence.is_online(&to).await {
                    let requester = from.clone();
                    if let Some(user) = self.store(move |db| db.get_user(&requester)).await? {
                        self.inner
                            .presence
                            .send_to(&to, ServerEvent::NewFriendRequest(user.profile()))
                            .await;
                    }
                }
                Ok(())
            }
            Err(FriendshipError::Store(e)) => Err(RouterError::Store(e)),
            Err(refused) => {
                debug!("{} -> {} friend request refused: {}", from, to, refused);
                session.reply(ServerEvent::FriendRequestSent {
                    success: false,
                    message: refused.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Apply the caller's answer to `requester`. On accept both sides are
    /// told to reload their full state rather than receiving a diff.
    pub async fn respond_to_friend_request(
        &self,
        session: &Session,
        requester: String,
        accept: bool,
    ) -> Result<(), RouterError> {
        if requester.is_empty() {
            return Err(RouterError::Malformed("username"));
        }

        let responder = session.username().to_string();
        let (a, b) = (responder.clone(), requester.clone());
        let changed = self
            .store(move |db| db.respond_to_request(&a, &b, accept))
            .await?;
        info!(
            "{} {} friend request from {} (changed={})",
            responder,
            if accept { "accepted" } else { "rejected" },
            requester,
            changed
        );

        if accept {
            self.inner.presence.send_to(&requester, ServerEvent::ReloadData).await;
            session.reply(ServerEvent::ReloadData);
        }
        Ok(())
    }

    // -- Server-originated events --

    /// Tell online friends that `username` has a new avatar.
    pub async fn avatar_updated(&self, username: &str, avatar_url: &str) -> Result<(), RouterError> {
        let event = ServerEvent::AvatarUpdated {
            username: username.to_string(),
            new_avatar_url: avatar_url.to_string(),
        };
        self.notify_friends(username, event).await
    }

    /// Send `event` to every online friend of `username`.
    async fn notify_friends(&self, username: &str, event: ServerEvent) -> Result<(), RouterError> {
        let owner = username.to_string();
        let friends = self.store(move |db| db.get_friends(&owner)).await?;

        for friend in friends {
            self.inner.presence.send_to(&friend.username, event.clone()).await;
        }
        Ok(())
    }
}
