use crate::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use std::path::Path as StdPath;
use std::time::UNIX_EPOCH;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::error;

use super::GalleryQuery;

/// Refreshes the thumbnail cache and returns the tile fragment, with any
/// requested filter/sort/pagination applied.
#[axum::debug_handler]
pub async fn gallery_content_handler(
    State(app_state): State<AppState>,
    Query(query): Query<GalleryQuery>,
) -> impl IntoResponse {
    match app_state.gallery.gallery_content(&query).await {
        Ok(fragment) => Html(fragment).into_response(),
        Err(e) => {
            error!("Error refreshing gallery content: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

#[axum::debug_handler]
pub async fn thumbnail_handler(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
) -> impl IntoResponse {
    let root = app_state.gallery.config().thumbnail_directory();
    serve_from_root(&root, &path).await
}

#[axum::debug_handler]
pub async fn image_handler(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
) -> impl IntoResponse {
    let root = app_state.gallery.config().source_directory.clone();
    serve_from_root(&root, &path).await
}

/// Stream a file from below `root`, rejecting traversal outside it.
pub(crate) async fn serve_from_root(root: &StdPath, relative: &str) -> Response {
    let file_path = root.join(relative.trim_start_matches('/'));

    if file_path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
        || !file_path.starts_with(root)
    {
        error!("Path traversal attempt: {:?}", file_path);
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let metadata = match tokio::fs::metadata(&file_path).await {
        Ok(m) if m.is_file() => m,
        _ => return (StatusCode::NOT_FOUND, "File not found").into_response(),
    };

    let file = match File::open(&file_path).await {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open file {:?}: {}", file_path, e);
            return (StatusCode::NOT_FOUND, "File not found").into_response();
        }
    };

    let content_type = mime_guess::from_path(&file_path)
        .first_or_octet_stream()
        .to_string();

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::CACHE_CONTROL, "public, max-age=86400");

    if let Ok(modified) = metadata.modified()
        && let Ok(duration) = modified.duration_since(UNIX_EPOCH)
    {
        let http_date = httpdate::fmt_http_date(modified);
        response = response.header(header::LAST_MODIFIED, http_date);

        // ETag from modification time and file size
        let etag = format!("\"{}-{}\"", duration.as_secs(), metadata.len());
        response = response.header(header::ETAG, etag);
    }

    match response.body(body) {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to build response: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}
