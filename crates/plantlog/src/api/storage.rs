//! Public object downloads, the target of `Blobs::public_url`.

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::AppState;
use crate::error::Error;

fn content_type(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

pub(super) async fn download(
    State(state): State<AppState>,
    Path((bucket, name)): Path<(String, String)>,
) -> Response {
    match state.backend.blobs.download(&bucket, &name).await {
        Ok(bytes) => ([(CONTENT_TYPE, content_type(&name))], bytes).into_response(),
        Err(Error::NotFound { .. }) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => e.into_response(),
    }
}
