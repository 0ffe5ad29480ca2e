//! HTTP route handlers: health, public room listing, and audio blob upload
//! and serving. Everything stateful (room/queue mutation) happens over the
//! WebSocket; these edges only exist because a browser needs a plain URL to
//! `POST` a file to and a plain URL to stream one back from.

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::api::response::{api_error, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{ErrorCode, StageError};
use crate::model::MediaSource;
use crate::protocol::RoomSummary;

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/rooms/public", get(list_public_rooms))
        .route("/rooms/upload", post(upload_audio))
        .route("/rooms/uploads/{filename}", get(serve_upload))
        .route("/rooms/downloads/{filename}", get(serve_download))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "rooms": state.registry.room_count(),
        "connections": state.ws_manager.connection_count(),
    }))
}

/// Lists every currently public room, for a lobby view before connecting.
async fn list_public_rooms(State(state): State<AppState>) -> impl IntoResponse {
    let rooms: Vec<RoomSummary> = state
        .registry
        .rooms_snapshot()
        .iter()
        .filter(|r| r.is_public)
        .map(RoomSummary::from_room)
        .collect();
    Json(rooms)
}

/// Accepts a host's audio upload (`multipart/form-data`, field `file`) and
/// returns the serving URL and a guessed title, ready to feed into a
/// `set_audio_source` message.
async fn upload_audio(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let max_bytes = state.config.read().max_upload_bytes;

    let mut bytes: Option<bytes::Bytes> = None;
    let mut title = String::from("Uploaded track");
    let mut extension = String::from("mp3");

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return StageError::InvalidRequest(e.to_string()).into_response(),
        };

        if field.name() == Some("file") {
            if let Some(name) = field.file_name() {
                if let Some((_, ext)) = name.rsplit_once('.') {
                    extension = ext.to_ascii_lowercase();
                }
                title = name.to_string();
            }
            match field.bytes().await {
                Ok(data) => bytes = Some(data),
                Err(e) => return StageError::InvalidRequest(e.to_string()).into_response(),
            }
        }
    }

    let Some(bytes) = bytes else {
        return StageError::InvalidRequest("missing `file` field".into()).into_response();
    };
    if bytes.len() > max_bytes {
        return StageError::InvalidRequest(format!(
            "upload exceeds {max_bytes} byte limit"
        ))
        .into_response();
    }

    match state.upload_store.put(&bytes, &extension) {
        Ok(url) => Json(json!({
            "source": MediaSource::Upload,
            "url": url,
            "title": title,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

fn guess_content_type(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "mp3" => "audio/mpeg",
        Some(ext) if ext == "wav" => "audio/wav",
        Some(ext) if ext == "flac" => "audio/flac",
        Some(ext) if ext == "ogg" => "audio/ogg",
        Some(ext) if ext == "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}

async fn serve_blob(store: &dyn crate::storage::BlobStore, filename: &str) -> Response {
    let Some(path) = store.path_for(filename) else {
        return StageError::UploadNotFound(filename.to_string()).into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(data) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, guess_content_type(filename))],
            Body::from(data),
        )
            .into_response(),
        Err(e) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            StageError::Internal(String::new()).code(),
            e,
        )
        .into_response(),
    }
}

async fn serve_upload(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    serve_blob(state.upload_store.as_ref(), &filename).await
}

async fn serve_download(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    serve_blob(state.download_store.as_ref(), &filename).await
}
