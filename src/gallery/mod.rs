// Gallery module - Main entry point
mod cache;
mod error;
mod handlers;
mod scan;
mod thumbs;
mod types;

// Re-export public items
pub use error::GalleryError;
pub use handlers::{gallery_content_handler, image_handler, thumbnail_handler};
pub(crate) use handlers::serve_from_root;
pub use types::*;

use std::{
    collections::HashMap,
    sync::Arc,
    sync::atomic::{AtomicBool, AtomicUsize},
    time::SystemTime,
};
use tokio::sync::RwLock;

pub const IMAGE_ROOT_URL: &str = "/images";
pub const THUMBNAIL_ROOT_URL: &str = "/thumbnails";

pub type SharedGallery = Arc<Gallery>;

pub struct Gallery {
    pub(crate) config: crate::GalleryConfig,
    pub(crate) metadata_cache: Arc<RwLock<HashMap<String, ImageMetadata>>>,
    pub(crate) cache_metadata: Arc<RwLock<CacheMetadata>>,
    pub(crate) metadata_cache_dirty: AtomicBool,
    pub(crate) metadata_updates_since_save: AtomicUsize,
}

impl Gallery {
    pub fn new(config: crate::GalleryConfig) -> Self {
        let metadata_cache = cache::load_metadata_cache(&config).unwrap_or_default();
        let cache_metadata = cache::load_cache_metadata(&config).unwrap_or_else(|_| CacheMetadata {
            version: String::new(), // Empty version will trigger full refresh
            last_full_refresh: SystemTime::UNIX_EPOCH,
        });

        Self {
            config,
            metadata_cache: Arc::new(RwLock::new(metadata_cache)),
            cache_metadata: Arc::new(RwLock::new(cache_metadata)),
            metadata_cache_dirty: AtomicBool::new(false),
            metadata_updates_since_save: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &crate::GalleryConfig {
        &self.config
    }

    pub(crate) fn is_image(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        lower.ends_with(".jpg")
            || lower.ends_with(".jpeg")
            || lower.ends_with(".png")
            || lower.ends_with(".gif")
            || lower.ends_with(".bmp")
            || lower.ends_with(".tiff")
            || lower.ends_with(".webp")
    }
}
