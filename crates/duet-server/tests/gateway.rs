use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use duet_api::auth::{AppState, AppStateInner};
use duet_db::Database;
use duet_gateway::EventRouter;
use duet_types::events::ServerEvent;
use duet_types::models::{MessageKind, PresenceStatus};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    db: Arc<Database>,
    http: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let upload_dir = std::env::temp_dir().join(format!(
            "duet-e2e-{}-{}",
            std::process::id(),
            nonce()
        ));
        let state: AppState = Arc::new(AppStateInner {
            db: db.clone(),
            jwt_secret: "e2e-secret".into(),
            router: EventRouter::new(db.clone()),
            upload_dir,
        });
        let app = duet_server::build_app(state, 1024 * 1024);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            db,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn register(&self, username: &str) -> String {
        let resp = self
            .http
            .post(self.url("/api/register"))
            .json(&json!({ "username": username, "password": "password123", "nickname": username }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let body: Value = resp.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn connect(&self, token: &str) -> Socket {
        let url = format!("ws://{}/gateway?token={}", self.addr, token);
        let (socket, _) = connect_async(url).await.unwrap();
        socket
    }
}

fn nonce() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}

/// Next server event, skipping control frames.
async fn next_event(socket: &mut Socket) -> ServerEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send(socket: &mut Socket, command: Value) {
    socket.send(Message::text(command.to_string())).await.unwrap();
}

#[tokio::test]
async fn friends_chat_over_the_gateway() {
    let server = TestServer::start().await;
    let alice_token = server.register("alice").await;
    let bob_token = server.register("bob").await;
    server.db.add_accepted_friendship("alice", "bob").unwrap();

    let mut bob = server.connect(&bob_token).await;
    assert_eq!(next_event(&mut bob).await, ServerEvent::Ready { username: "bob".into() });

    let mut alice = server.connect(&alice_token).await;
    assert_eq!(next_event(&mut alice).await, ServerEvent::Ready { username: "alice".into() });
    assert_eq!(
        next_event(&mut bob).await,
        ServerEvent::StatusChange {
            username: "alice".into(),
            status: PresenceStatus::Online,
        }
    );

    send(
        &mut alice,
        json!({ "type": "send_message", "data": { "recipient_username": "bob", "text": "hi bob", "temp_id": "1" } }),
    )
    .await;

    let ServerEvent::ReceiveMessage(received) = next_event(&mut bob).await else {
        panic!("bob expected a message");
    };
    assert_eq!(received.sender_username, "alice");
    assert_eq!(received.kind, MessageKind::Text);
    assert_eq!(received.content.as_deref(), Some("hi bob"));

    let ServerEvent::ReceiveMessage(echo) = next_event(&mut alice).await else {
        panic!("alice expected her echo");
    };
    assert_eq!(echo.temp_id.as_deref(), Some("1"));
    assert_eq!(echo.timestamp, received.timestamp);

    send(&mut bob, json!({ "type": "load_chat_history", "data": { "contact_username": "alice" } })).await;
    let ServerEvent::ChatHistoryResponse { contact, history } = next_event(&mut bob).await else {
        panic!("bob expected history");
    };
    assert_eq!(contact, "alice");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message.content.as_deref(), Some("hi bob"));

    alice.close(None).await.unwrap();
    assert_eq!(
        next_event(&mut bob).await,
        ServerEvent::StatusChange {
            username: "alice".into(),
            status: PresenceStatus::Offline,
        }
    );
}

#[tokio::test]
async fn gateway_refuses_bad_tokens() {
    let server = TestServer::start().await;
    server.register("alice").await;

    let missing = connect_async(format!("ws://{}/gateway", server.addr)).await;
    assert!(missing.is_err());
    let forged = connect_async(format!("ws://{}/gateway?token=forged", server.addr)).await;
    assert!(forged.is_err());
}

#[tokio::test]
async fn uploaded_files_are_served_back() {
    let server = TestServer::start().await;
    let token = server.register("alice").await;

    let part = reqwest::multipart::Part::bytes(b"hello duet".to_vec()).file_name("my notes.txt");
    let form = reqwest::multipart::Form::new().part("file", part);
    let resp = server
        .http
        .post(server.url("/upload"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    let file_url = body["file_url"].as_str().unwrap();
    assert!(file_url.starts_with("/uploads/"));
    assert!(file_url.ends_with("-my_notes.txt"));

    let served = server.http.get(server.url(file_url)).send().await.unwrap();
    assert_eq!(served.status(), reqwest::StatusCode::OK);
    assert_eq!(&served.bytes().await.unwrap()[..], b"hello duet");
}

#[tokio::test]
async fn uploads_require_a_token() {
    let server = TestServer::start().await;
    let form = reqwest::multipart::Form::new()
        .part("file", reqwest::multipart::Part::bytes(b"x".to_vec()).file_name("x.txt"));
    let resp = server.http.post(server.url("/upload")).multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
}
