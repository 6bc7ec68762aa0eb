use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use shashinten::{Config, create_app};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();

    let photos_dir = temp_dir.path().join("photos");
    let cache_dir = temp_dir.path().join("cache");

    std::fs::create_dir_all(&photos_dir).unwrap();
    std::fs::create_dir_all(&cache_dir).unwrap();

    config.gallery.source_directory = photos_dir;
    config.gallery.cache_directory = cache_dir;
    config.gallery.thumbnail_percentage = 20;
    config.gallery.refresh_interval_minutes = None;

    config.templates.directory = PathBuf::from("templates");
    config.static_files.directory = PathBuf::from("static");

    config
}

/// A 40x20 image with a red left half, so rotation and color operations are
/// observable in the decoded output.
fn create_source_image(path: &Path) {
    use image::{ImageBuffer, Rgb};

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }

    let img = ImageBuffer::from_fn(40, 20, |x, _y| {
        if x < 20 {
            Rgb([220u8, 30, 30])
        } else {
            Rgb([30u8, 30, 220])
        }
    });
    img.save(path).unwrap();
}

#[tokio::test]
async fn test_rotate_produces_preview() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    create_source_image(&config.gallery.source_directory.join("rot.jpg"));

    let app = create_app(config).await;
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/api/image-operation")
        .json(&json!({
            "image_path": "/images/rot.jpg",
            "operation": "rotate",
            "rotation": 90,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    let preview_url = body["preview_url"].as_str().unwrap();
    assert!(preview_url.starts_with("/edits/"));
    assert!(preview_url.ends_with(".jpg"));

    let preview = server.get(preview_url).await;
    assert_eq!(preview.status_code(), StatusCode::OK);

    let decoded = image::load_from_memory(preview.as_bytes()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (20, 40));
}

#[tokio::test]
async fn test_repeated_edits_replace_the_pending_preview() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    create_source_image(&config.gallery.source_directory.join("twice.jpg"));

    let app = create_app(config).await;
    let server = TestServer::new(app).unwrap();

    let first = server
        .post("/api/image-operation")
        .json(&json!({
            "image_path": "/images/twice.jpg",
            "operation": "rotate",
            "rotation": 90,
        }))
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);

    // The client accumulates rotation and re-applies from the source
    let second = server
        .post("/api/image-operation")
        .json(&json!({
            "image_path": "/images/twice.jpg",
            "operation": "rotate",
            "rotation": 180,
        }))
        .await;
    assert_eq!(second.status_code(), StatusCode::OK);

    let first_body: Value = first.json();
    let second_body: Value = second.json();
    assert_eq!(first_body["preview_url"], second_body["preview_url"]);

    let preview = server.get(second_body["preview_url"].as_str().unwrap()).await;
    let decoded = image::load_from_memory(preview.as_bytes()).unwrap();
    // 180 degrees keeps the original orientation
    assert_eq!((decoded.width(), decoded.height()), (40, 20));
}

#[tokio::test]
async fn test_greyscale_saved_over_original() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    let source = config.gallery.source_directory.join("grey.jpg");
    create_source_image(&source);

    let app = create_app(config).await;
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/api/image-operation")
        .json(&json!({
            "image_path": "/images/grey.jpg",
            "operation": "greyscale",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .post("/api/save-image")
        .json(&json!({
            "image_path": "/images/grey.jpg",
            "mode": "original",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["saved_path"], "grey.jpg");
    assert_eq!(body["url"], "/images/grey.jpg");

    let saved = image::open(&source).unwrap();
    assert_eq!(saved.color().channel_count(), 1);
}

#[tokio::test]
async fn test_save_as_copy_leaves_original_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    let source = config.gallery.source_directory.join("keep.jpg");
    create_source_image(&source);

    let app = create_app(config.clone()).await;
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/api/image-operation")
        .json(&json!({
            "image_path": "/images/keep.jpg",
            "operation": "rotate",
            "rotation": 90,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .post("/api/save-image")
        .json(&json!({
            "image_path": "/images/keep.jpg",
            "mode": "copy",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["saved_path"], "keep-copy1.jpg");

    let copy_path = config.gallery.source_directory.join("keep-copy1.jpg");
    let copy = image::open(&copy_path).unwrap();
    assert_eq!((copy.width(), copy.height()), (20, 40));

    let original = image::open(&source).unwrap();
    assert_eq!((original.width(), original.height()), (40, 20));

    // A second edit-and-copy picks the next free number
    server
        .post("/api/image-operation")
        .json(&json!({
            "image_path": "/images/keep.jpg",
            "operation": "rotate",
            "rotation": 180,
        }))
        .await;
    let response = server
        .post("/api/save-image")
        .json(&json!({
            "image_path": "/images/keep.jpg",
            "mode": "copy",
        }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["saved_path"], "keep-copy2.jpg");
}

#[tokio::test]
async fn test_save_without_pending_edit_is_404() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    create_source_image(&config.gallery.source_directory.join("plain.jpg"));

    let app = create_app(config).await;
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/api/save-image")
        .json(&json!({
            "image_path": "/images/plain.jpg",
            "mode": "original",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let body: Value = response.json();
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_operation_on_missing_image_is_404() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);

    let app = create_app(config).await;
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/api/image-operation")
        .json(&json!({
            "image_path": "/images/ghost.jpg",
            "operation": "greyscale",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsupported_rotation_is_400() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    create_source_image(&config.gallery.source_directory.join("tilt.jpg"));

    let app = create_app(config).await;
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/api/image-operation")
        .json(&json!({
            "image_path": "/images/tilt.jpg",
            "operation": "rotate",
            "rotation": 45,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_traversal_paths_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);

    let app = create_app(config).await;
    let server = TestServer::new(app).unwrap();

    for endpoint in ["/api/image-operation", "/api/save-image", "/api/move-to-deleted"] {
        let mut body = json!({ "image_path": "/images/../escape.jpg" });
        if endpoint == "/api/image-operation" {
            body["operation"] = json!("greyscale");
        }
        if endpoint == "/api/save-image" {
            body["mode"] = json!("original");
        }

        let response = server.post(endpoint).json(&body).await;
        assert_eq!(
            response.status_code(),
            StatusCode::BAD_REQUEST,
            "expected 400 from {}",
            endpoint
        );
    }
}

#[tokio::test]
async fn test_move_to_deleted_removes_from_gallery() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    let photos = config.gallery.source_directory.clone();
    create_source_image(&photos.join("trips").join("unwanted.jpg"));
    create_source_image(&photos.join("trips").join("keeper.jpg"));

    let app = create_app(config).await;
    let server = TestServer::new(app).unwrap();

    let response = server.get("/thumbnails/gallery-content.html").await;
    assert!(response.text().contains("unwanted.jpg"));

    let response = server
        .post("/api/move-to-deleted")
        .json(&json!({ "image_path": "/images/trips/unwanted.jpg" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["success"], true);

    assert!(!photos.join("trips").join("unwanted.jpg").exists());
    assert!(photos.join("trips").join(".deleted").join("unwanted.jpg").exists());

    // Dot-folders are never scanned, so the image drops out on refresh
    let response = server.get("/thumbnails/gallery-content.html").await;
    let html = response.text();
    assert!(!html.contains("unwanted.jpg"));
    assert!(html.contains("keeper.jpg"));
}

#[tokio::test]
async fn test_pending_edit_traversal_rejected() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    std::fs::write(temp_dir.path().join("secret.txt"), "top secret").unwrap();

    let app = create_app(config).await;

    // TestServer's client normalizes dot segments, so send the literal URI
    // straight to the router the way a raw client can.
    let request = Request::builder()
        .uri("/edits/../secret.txt")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
