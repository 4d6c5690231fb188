pub mod config;
pub mod seed;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, warn};

use duet_api::auth::{self, AppState};
use duet_api::files::{self, UPLOADS_URL_PREFIX};
use duet_api::middleware::require_auth;
use duet_gateway::connection;

#[derive(Debug, Deserialize)]
struct GatewayParams {
    token: Option<String>,
}

/// Assemble every route: auth, uploads, static files and the gateway.
pub fn build_app(state: AppState, max_upload_bytes: usize) -> Router {
    let public_routes = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/upload", post(files::upload_file))
        .route("/upload_avatar", post(files::upload_avatar))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .nest_service(UPLOADS_URL_PREFIX, ServeDir::new(&state.upload_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// GET /gateway?token=... The token is checked before the upgrade so a
/// socket only ever exists for a known user.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<GatewayParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let token = params.token.ok_or(StatusCode::UNAUTHORIZED)?;
    let username = connection::verify_token(&token, &state.jwt_secret).ok_or_else(|| {
        warn!("Gateway upgrade with invalid token");
        StatusCode::UNAUTHORIZED
    })?;

    let db = state.db.clone();
    let name = username.clone();
    let exists = tokio::task::spawn_blocking(move || db.get_user(&name))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
        .map_err(|e| { error!("DB get_user error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
        .is_some();
    if !exists {
        warn!("Gateway upgrade for unknown user {}", username);
        return Err(StatusCode::UNAUTHORIZED);
    }

    let router = state.router.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection_authenticated(socket, router, username)))
}
