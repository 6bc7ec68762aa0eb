use super::{EditError, EditOperation, ops};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path as StdPath, PathBuf};
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct ImageOperationRequest {
    pub image_path: String,
    pub operation: EditOperation,
    pub rotation: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    Original,
    Copy,
}

#[derive(Debug, Deserialize)]
pub struct SaveImageRequest {
    pub image_path: String,
    pub mode: SaveMode,
}

#[derive(Debug, Deserialize)]
pub struct MoveToDeletedRequest {
    pub image_path: String,
}

/// Applies an edit to the source image and stores the result as a pending
/// edit the viewer can preview before saving.
#[axum::debug_handler]
pub async fn image_operation_handler(
    State(app_state): State<AppState>,
    Json(request): Json<ImageOperationRequest>,
) -> Response {
    let relative = match resolve_relative(&request.image_path) {
        Ok(relative) => relative,
        Err(e) => return edit_error_response(e),
    };

    let config = app_state.gallery.config();
    let source_path = config.source_directory.join(&relative);

    match tokio::fs::metadata(&source_path).await {
        Ok(m) if m.is_file() => {}
        _ => return edit_error_response(EditError::NotFound),
    }

    let edits_dir = config.edits_directory();
    if let Err(e) = tokio::fs::create_dir_all(&edits_dir).await {
        return edit_error_response(EditError::IoError(e));
    }

    let filename = match pending_edit_filename(&relative) {
        Ok(filename) => filename,
        Err(e) => return edit_error_response(e),
    };
    let pending_path = edits_dir.join(&filename);

    let operation = request.operation;
    let rotation = request.rotation;
    let source = source_path.clone();
    let pending = pending_path.clone();

    let result = tokio::task::spawn_blocking(move || -> Result<(), EditError> {
        let file = std::fs::File::open(&source)?;
        let img = image::ImageReader::new(std::io::BufReader::new(file))
            .with_guessed_format()?
            .decode()?;

        let edited = ops::apply(img, operation, rotation)?;
        edited.save(&pending)?;
        Ok(())
    })
    .await
    .map_err(|e| EditError::IoError(std::io::Error::other(e)))
    .and_then(|inner| inner);

    match result {
        Ok(()) => {
            info!("Applied {:?} to {}, pending edit at {:?}", operation, relative, pending_path);
            Json(json!({ "preview_url": format!("/edits/{}", filename) })).into_response()
        }
        Err(e) => {
            error!("Image operation failed for {}: {}", relative, e);
            edit_error_response(e)
        }
    }
}

/// Moves the pending edit over the original, or to a fresh `-copyN` sibling.
#[axum::debug_handler]
pub async fn save_image_handler(
    State(app_state): State<AppState>,
    Json(request): Json<SaveImageRequest>,
) -> Response {
    let relative = match resolve_relative(&request.image_path) {
        Ok(relative) => relative,
        Err(e) => return edit_error_response(e),
    };

    let config = app_state.gallery.config();
    let source_path = config.source_directory.join(&relative);

    let filename = match pending_edit_filename(&relative) {
        Ok(filename) => filename,
        Err(e) => return edit_error_response(e),
    };
    let pending_path = config.edits_directory().join(&filename);

    if !matches!(tokio::fs::try_exists(&pending_path).await, Ok(true)) {
        return edit_error_response(EditError::NoPendingEdit);
    }

    let destination = match request.mode {
        SaveMode::Original => source_path.clone(),
        SaveMode::Copy => match next_copy_path(&source_path).await {
            Ok(path) => path,
            Err(e) => return edit_error_response(e),
        },
    };

    if let Err(e) = move_file(&pending_path, &destination).await {
        error!("Failed to move pending edit to {:?}: {}", destination, e);
        return edit_error_response(EditError::IoError(e));
    }

    let saved_relative = destination
        .strip_prefix(&config.source_directory)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| relative.clone());

    info!("Saved edit of {} to {}", relative, saved_relative);

    Json(json!({
        "saved_path": saved_relative,
        "url": format!("{}/{}", crate::gallery::IMAGE_ROOT_URL, saved_relative),
    }))
    .into_response()
}

/// Moves the source image into a `.deleted` sibling folder. Dot-folders are
/// never scanned, so the image drops out of the gallery on the next refresh.
#[axum::debug_handler]
pub async fn move_to_deleted_handler(
    State(app_state): State<AppState>,
    Json(request): Json<MoveToDeletedRequest>,
) -> Response {
    let relative = match resolve_relative(&request.image_path) {
        Ok(relative) => relative,
        Err(e) => return edit_error_response(e),
    };

    let config = app_state.gallery.config();
    let source_path = config.source_directory.join(&relative);

    let (parent, file_name) = match (source_path.parent(), source_path.file_name()) {
        (Some(parent), Some(file_name)) => (parent.to_path_buf(), file_name.to_owned()),
        _ => return edit_error_response(EditError::InvalidPath),
    };

    let deleted_dir = parent.join(".deleted");
    if let Err(e) = tokio::fs::create_dir_all(&deleted_dir).await {
        return edit_error_response(EditError::IoError(e));
    }

    let destination = deleted_dir.join(file_name);
    if let Err(e) = move_file(&source_path, &destination).await {
        error!("Failed to move {} to .deleted: {}", relative, e);
        return edit_error_response(EditError::IoError(e));
    }

    info!("Moved {} to {:?}", relative, destination);
    Json(json!({ "success": true })).into_response()
}

/// Serves a pending edit so the viewer can preview it.
#[axum::debug_handler]
pub async fn pending_edit_handler(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
) -> Response {
    let root = app_state.gallery.config().edits_directory();
    crate::gallery::serve_from_root(&root, &path).await
}

/// Reduce a client-supplied image path (`/images/<rel>` or `<rel>`) to a
/// validated source-relative path.
fn resolve_relative(image_path: &str) -> Result<String, EditError> {
    let decoded = urlencoding::decode(image_path).map_err(|_| EditError::InvalidPath)?;

    let trimmed = decoded
        .strip_prefix(crate::gallery::IMAGE_ROOT_URL)
        .unwrap_or(&decoded)
        .trim_start_matches('/');

    if trimmed.is_empty() {
        return Err(EditError::InvalidPath);
    }

    let candidate = StdPath::new(trimmed);
    let traversal = candidate.components().any(|c| {
        matches!(
            c,
            std::path::Component::ParentDir
                | std::path::Component::RootDir
                | std::path::Component::Prefix(_)
        )
    });
    if traversal {
        return Err(EditError::InvalidPath);
    }

    Ok(trimmed.to_string())
}

/// Pending edits are keyed by a digest of the relative path so same-named
/// files in different folders never collide.
fn pending_edit_filename(relative: &str) -> Result<String, EditError> {
    let extension = StdPath::new(relative)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or(EditError::InvalidPath)?
        .to_lowercase();

    let mut hasher = Sha256::new();
    hasher.update(relative.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    Ok(format!("{}.{}", &digest[..16], extension))
}

/// First free `<stem>-copy<N>.<ext>` sibling of `path`.
async fn next_copy_path(path: &StdPath) -> Result<PathBuf, EditError> {
    let parent = path.parent().ok_or(EditError::InvalidPath)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or(EditError::InvalidPath)?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let mut copy_num = 1u32;
    loop {
        let candidate_name = if extension.is_empty() {
            format!("{}-copy{}", stem, copy_num)
        } else {
            format!("{}-copy{}.{}", stem, copy_num, extension)
        };
        let candidate = parent.join(candidate_name);
        if !matches!(tokio::fs::try_exists(&candidate).await, Ok(true)) {
            return Ok(candidate);
        }
        copy_num += 1;
    }
}

/// Rename with a copy+remove fallback for cross-device moves.
async fn move_file(from: &StdPath, to: &StdPath) -> Result<(), std::io::Error> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}

fn edit_error_response(error: EditError) -> Response {
    let status = match &error {
        EditError::InvalidPath | EditError::UnsupportedRotation(_) => StatusCode::BAD_REQUEST,
        EditError::NoPendingEdit | EditError::NotFound => StatusCode::NOT_FOUND,
        EditError::ImageError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EditError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}
