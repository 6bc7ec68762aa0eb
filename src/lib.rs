use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod edits;
pub mod gallery;
pub mod startup_checks;
pub mod static_files;
pub mod templating;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub templates: TemplateConfig,
    pub static_files: StaticConfig,
    pub gallery: GalleryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub name: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TemplateConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GalleryConfig {
    pub source_directory: PathBuf,
    pub cache_directory: PathBuf,
    /// Thumbnail edge scale as a percentage of the original dimensions.
    pub thumbnail_percentage: u32,
    /// Directory names excluded from scanning in addition to dot-folders.
    #[serde(default)]
    pub ignore_folders: Vec<String>,
    pub refresh_interval_minutes: Option<u64>,
}

impl GalleryConfig {
    /// Root of the thumbnail cache for the configured scale.
    pub fn thumbnail_directory(&self) -> PathBuf {
        self.cache_directory
            .join(format!("thumbnails-{}", self.thumbnail_percentage))
    }

    /// Holding area for pending (unsaved) image edits.
    pub fn edits_directory(&self) -> PathBuf {
        self.cache_directory.join("edits")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            app: AppConfig {
                name: "Shashinten".to_string(),
                log_level: "info".to_string(),
            },
            templates: TemplateConfig {
                directory: PathBuf::from("templates"),
            },
            static_files: StaticConfig {
                directory: PathBuf::from("static"),
            },
            gallery: GalleryConfig {
                source_directory: PathBuf::from("photos"),
                cache_directory: PathBuf::from("cache"),
                thumbnail_percentage: 20,
                ignore_folders: Vec::new(),
                refresh_interval_minutes: Some(60),
            },
        }
    }
}

use axum::{
    Router,
    extract::{Path, State},
    response::IntoResponse,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub template_engine: Arc<templating::TemplateEngine>,
    pub static_handler: static_files::StaticFileHandler,
    pub gallery: gallery::SharedGallery,
    pub config: Config,
}

async fn static_file_handler(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
    axum::extract::RawQuery(query): axum::extract::RawQuery,
) -> impl IntoResponse {
    let has_version = query.is_some_and(|q| q.contains("v="));
    app_state.static_handler.serve(&path, has_version).await
}

pub async fn create_app(config: Config) -> Router {
    let template_engine = Arc::new(templating::TemplateEngine::new(
        config.templates.directory.clone(),
    ));

    let static_handler =
        static_files::StaticFileHandler::new(config.static_files.directory.clone());

    let gallery = Arc::new(gallery::Gallery::new(config.gallery.clone()));

    let app_state = AppState {
        template_engine,
        static_handler,
        gallery,
        config: config.clone(),
    };

    Router::new()
        .route("/", axum::routing::get(templating::index_handler))
        .route(
            "/thumbnails/gallery-content.html",
            axum::routing::get(gallery::gallery_content_handler),
        )
        .route(
            "/thumbnails/{*path}",
            axum::routing::get(gallery::thumbnail_handler),
        )
        .route(
            "/images/{*path}",
            axum::routing::get(gallery::image_handler),
        )
        .route(
            "/edits/{*path}",
            axum::routing::get(edits::pending_edit_handler),
        )
        .route(
            "/api/image-operation",
            axum::routing::post(edits::image_operation_handler),
        )
        .route(
            "/api/save-image",
            axum::routing::post(edits::save_image_handler),
        )
        .route(
            "/api/move-to-deleted",
            axum::routing::post(edits::move_to_deleted_handler),
        )
        .route("/static/{*path}", axum::routing::get(static_file_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let method = request.method();
                    let uri = request.uri();
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::info_span!(
                        "http_request",
                        method = %method,
                        uri = %uri,
                        matched_path,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    let method = request.method();
                    let uri = request.uri();
                    let headers = request.headers();
                    let user_agent = headers
                        .get("user-agent")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");
                    let referer = headers
                        .get("referer")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");

                    tracing::info!(
                        target: "access_log",
                        method = %method,
                        path = %uri.path(),
                        query = ?uri.query(),
                        user_agent = %user_agent,
                        referer = %referer,
                        "request"
                    );
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let status = response.status();
                        let size = response
                            .headers()
                            .get("content-length")
                            .and_then(|h| h.to_str().ok())
                            .unwrap_or("-");

                        tracing::info!(
                            target: "access_log",
                            status = %status,
                            size = %size,
                            latency_ms = %latency.as_millis(),
                            "response"
                        );
                    },
                ),
        )
        .with_state(app_state)
}
