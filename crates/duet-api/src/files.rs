use std::path::Path;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info, warn};

use duet_types::api::{AvatarResponse, UploadResponse};

use crate::auth::AppState;
use crate::middleware::AuthUser;

/// Public URL prefix the upload directory is served under.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

const AVATAR_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// POST /upload — multipart field `file`. Saves it as `{unix}-{name}` and
/// returns its public URL. The chat message referencing it is sent
/// separately over the gateway.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, StatusCode> {
    let (original_name, data) = read_file_field(&mut multipart, "file").await?;

    let stored_name = format!("{}-{}", chrono::Utc::now().timestamp(), sanitize_filename(&original_name));
    save_upload(&state.upload_dir, &stored_name, &data).await?;
    info!("{} uploaded {} ({} bytes)", user.username, stored_name, data.len());

    Ok(Json(UploadResponse {
        success: true,
        file_url: format!("{}/{}", UPLOADS_URL_PREFIX, stored_name),
    }))
}

/// POST /upload_avatar — multipart field `avatar`, images only. Updates the
/// user's avatar and tells their online friends.
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, StatusCode> {
    let (original_name, data) = read_file_field(&mut multipart, "avatar").await?;
    let ext = avatar_extension(&original_name).ok_or(StatusCode::BAD_REQUEST)?;

    let stored_name = format!(
        "avatar_{}_{}.{}",
        sanitize_filename(&user.username),
        chrono::Utc::now().timestamp(),
        ext
    );
    save_upload(&state.upload_dir, &stored_name, &data).await?;
    let avatar_url = format!("{}/{}", UPLOADS_URL_PREFIX, stored_name);

    let db = state.db.clone();
    let (name, url) = (user.username.clone(), avatar_url.clone());
    tokio::task::spawn_blocking(move || db.update_avatar(&name, &url))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
        .map_err(|e| { error!("DB update_avatar error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?;
    info!("{} changed avatar to {}", user.username, avatar_url);

    // The avatar is already saved; a failed notification is not the caller's problem
    if let Err(e) = state.router.avatar_updated(&user.username, &avatar_url).await {
        warn!("{} avatar notification failed: {}", user.username, e);
    }

    Ok(Json(AvatarResponse {
        success: true,
        new_avatar_url: avatar_url,
    }))
}

/// Find the multipart field `name` and return its client filename and bytes.
async fn read_file_field(multipart: &mut Multipart, name: &str) -> Result<(String, Bytes), StatusCode> {
    while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        if field.name() != Some(name) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(StatusCode::BAD_REQUEST);
        }
        let data = field.bytes().await.map_err(|e| {
            warn!("Failed to read upload body: {}", e);
            StatusCode::BAD_REQUEST
        })?;
        return Ok((filename, data));
    }

    Err(StatusCode::BAD_REQUEST)
}

async fn save_upload(dir: &Path, stored_name: &str, data: &[u8]) -> Result<(), StatusCode> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        error!("Failed to create upload directory {}: {}", dir.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let path = dir.join(stored_name);
    tokio::fs::write(&path, data).await.map_err(|e| {
        error!("Failed to write file {}: {}", path.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Reduce a client-supplied filename to a safe ASCII basename.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let joined = base.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lower-cased extension if the file is an accepted avatar image.
pub fn avatar_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    AVATAR_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}
