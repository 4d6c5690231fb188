use std::path::PathBuf;
use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};

use duet_db::Database;
use duet_gateway::EventRouter;
use duet_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub router: EventRouter,
    pub upload_dir: PathBuf,
}

/// Avatar given to users who never uploaded one.
pub fn default_avatar(username: &str) -> String {
    format!("https://i.pravatar.cc/150?u={}", username)
}

/// Hash a password with Argon2id into a PHC string.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Validate input
    let username = req.username.trim().to_string();
    let nickname = req.nickname.trim().to_string();
    let name_len = username.chars().count();
    if !(3..=32).contains(&name_len) || username.chars().any(char::is_whitespace) {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.chars().count() < 8 || nickname.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let password_hash = hash_password(&req.password).map_err(|e| {
        error!("{}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let db = state.db.clone();
    let name = username.clone();
    let created = tokio::task::spawn_blocking(move || {
        db.create_user(&name, &password_hash, &nickname, Some(default_avatar(&name).as_str()))
    })
    .await
    .map_err(|e| { error!("spawn_blocking join error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
    .map_err(|e| { error!("DB create_user error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?;

    if !created {
        return Err(StatusCode::CONFLICT);
    }
    info!("Registered user {}", username);

    let token = create_token(&state.jwt_secret, &username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            username,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let name = req.username.clone();
    let user = tokio::task::spawn_blocking(move || db.get_user(&name))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify password
    let parsed_hash =
        PasswordHash::new(&user.password_hash).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let token = create_token(&state.jwt_secret, &user.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(LoginResponse {
        username: user.username,
        nickname: user.nickname,
        token,
    }))
}

pub fn create_token(secret: &str, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_gateway::connection::verify_token;

    fn state() -> AppState {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Arc::new(AppStateInner {
            router: EventRouter::new(db.clone()),
            db,
            jwt_secret: "test-secret".into(),
            upload_dir: std::env::temp_dir(),
        })
    }

    fn register_req(username: &str, password: &str) -> Json<RegisterRequest> {
        Json(RegisterRequest {
            username: username.into(),
            password: password.into(),
            nickname: "Alice".into(),
        })
    }

    fn login_req(username: &str, password: &str) -> Json<LoginRequest> {
        Json(LoginRequest {
            username: username.into(),
            password: password.into(),
        })
    }

    #[tokio::test]
    async fn register_then_login() {
        let state = state();
        let resp = register(State(state.clone()), register_req("alice", "correct horse"))
            .await
            .unwrap()
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let user = state.db.get_user("alice").unwrap().unwrap();
        assert_ne!(user.password_hash, "correct horse");
        assert_eq!(user.avatar.as_deref(), Some(default_avatar("alice").as_str()));

        let resp = login(State(state.clone()), login_req("alice", "correct horse"))
            .await
            .unwrap()
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let state = state();
        register(State(state.clone()), register_req("alice", "password1")).await.unwrap();
        let err = register(State(state), register_req("alice", "password2")).await.err();
        assert_eq!(err, Some(StatusCode::CONFLICT));
    }

    #[tokio::test]
    async fn weak_input_is_rejected() {
        let state = state();
        for (user, pass) in [("al", "password1"), ("alice", "short"), ("al ice", "password1")] {
            let err = register(State(state.clone()), register_req(user, pass)).await.err();
            assert_eq!(err, Some(StatusCode::BAD_REQUEST), "{} / {}", user, pass);
        }
    }

    #[tokio::test]
    async fn username_length_counts_characters() {
        let state = state();
        let cjk = "爱".repeat(16);
        let resp = register(State(state.clone()), register_req(&cjk, "password1"))
            .await
            .unwrap()
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let too_long = "a".repeat(33);
        let err = register(State(state), register_req(&too_long, "password1")).await.err();
        assert_eq!(err, Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let state = state();
        register(State(state.clone()), register_req("alice", "password1")).await.unwrap();

        let err = login(State(state.clone()), login_req("alice", "password2")).await.err();
        assert_eq!(err, Some(StatusCode::UNAUTHORIZED));
        let err = login(State(state), login_req("nobody", "password1")).await.err();
        assert_eq!(err, Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn token_round_trips_through_gateway_check() {
        let token = create_token("s3cret", "alice").unwrap();
        assert_eq!(verify_token(&token, "s3cret").as_deref(), Some("alice"));
    }
}
