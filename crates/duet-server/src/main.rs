use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use duet_api::auth::{AppState, AppStateInner};
use duet_db::Database;
use duet_gateway::EventRouter;
use duet_server::config::Config;
use duet_server::{build_app, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "duet_server=debug,duet_gateway=debug,duet_api=debug,duet_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    if config.uses_dev_secret() {
        warn!("DUET_JWT_SECRET is not set; using the development secret");
    }

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    if config.seed_demo {
        seed::seed_demo(&db)?;
    }
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let router = EventRouter::new(db.clone());
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        router,
        upload_dir: config.upload_dir.clone(),
    });

    let app = build_app(state, config.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Duet server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
