use super::{CacheMetadata, Gallery, ImageMetadata};
use crate::GalleryConfig;
use std::collections::HashMap;
use tracing::{debug, error, info};

impl Gallery {
    pub async fn initialize_and_check_version(&self) -> Result<(), super::GalleryError> {
        let current_version = env!("CARGO_PKG_VERSION");

        let mut metadata = self.cache_metadata.write().await;
        let needs_refresh = metadata.version != current_version;

        if needs_refresh {
            info!(
                "Version change detected ({}), refreshing metadata cache",
                current_version
            );

            // Clear the old metadata cache
            let mut cache = self.metadata_cache.write().await;
            cache.clear();
            drop(cache);

            metadata.version = current_version.to_string();
            metadata.last_full_refresh = std::time::SystemTime::now();
            drop(metadata);

            self.save_cache_metadata().await?;
        }

        Ok(())
    }

    pub async fn is_metadata_cache_empty(&self) -> bool {
        self.metadata_cache.read().await.is_empty()
    }

    /// Re-run the scan, thumbnail refresh and fragment write on a timer.
    pub fn start_background_refresh(gallery: super::SharedGallery, interval_minutes: u64) {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(interval_minutes * 60));
            interval.tick().await; // Skip the first immediate tick

            loop {
                interval.tick().await;
                info!("Starting scheduled gallery refresh");

                if let Err(e) = gallery.refresh_gallery().await {
                    error!("Failed to refresh gallery: {}", e);
                }
            }
        });
    }

    pub fn start_periodic_cache_save(gallery: super::SharedGallery, interval_minutes: u64) {
        use std::sync::atomic::Ordering;

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(interval_minutes * 60));
            interval.tick().await; // Skip the first immediate tick

            loop {
                interval.tick().await;

                if gallery.metadata_cache_dirty.load(Ordering::Relaxed) {
                    debug!("Cache is dirty, saving to disk");

                    if let Err(e) = gallery.save_metadata_cache().await {
                        error!("Failed to save metadata cache: {}", e);
                    } else {
                        info!("Periodic metadata cache save completed");
                    }
                }
            }
        });
    }

    pub(crate) async fn save_metadata_cache(&self) -> Result<(), super::GalleryError> {
        use std::sync::atomic::Ordering;

        let cache_file = self.config.cache_directory.join("metadata_cache.json");
        let cache = self.metadata_cache.read().await;

        let json = serde_json::to_string_pretty(&*cache)?;
        tokio::fs::write(cache_file, json).await?;

        // Reset dirty flag after successful save
        self.metadata_cache_dirty.store(false, Ordering::Relaxed);
        self.metadata_updates_since_save.store(0, Ordering::Relaxed);

        Ok(())
    }

    pub(crate) async fn save_cache_metadata(&self) -> Result<(), super::GalleryError> {
        let metadata_file = self.config.cache_directory.join("cache_metadata.json");
        let metadata = self.cache_metadata.read().await;

        let json = serde_json::to_string_pretty(&*metadata)?;
        tokio::fs::write(metadata_file, json).await?;

        Ok(())
    }

    pub async fn save_caches(&self) -> Result<(), super::GalleryError> {
        tokio::fs::create_dir_all(&self.config.cache_directory).await?;

        self.save_metadata_cache().await?;
        self.save_cache_metadata().await?;

        info!("Saved gallery caches to disk");
        Ok(())
    }

    pub(crate) async fn insert_metadata_with_tracking(&self, path: String, metadata: ImageMetadata) {
        use std::sync::atomic::Ordering;

        let mut cache = self.metadata_cache.write().await;
        cache.insert(path, metadata);

        self.metadata_cache_dirty.store(true, Ordering::Relaxed);

        let updates = self.metadata_updates_since_save.fetch_add(1, Ordering::Relaxed) + 1;

        // If we've made enough updates, trigger a save
        const UPDATES_BEFORE_SAVE: usize = 100;
        if updates >= UPDATES_BEFORE_SAVE {
            drop(cache); // Release the lock before saving

            if let Err(e) = self.save_metadata_cache().await {
                error!("Failed to save metadata cache after {} updates: {}", updates, e);
            } else {
                debug!("Saved metadata cache after {} updates", updates);
            }
        }
    }
}

pub(crate) fn load_metadata_cache(
    config: &GalleryConfig,
) -> Result<HashMap<String, ImageMetadata>, super::GalleryError> {
    let cache_file = config.cache_directory.join("metadata_cache.json");

    if !cache_file.exists() {
        debug!("Metadata cache file not found, starting with empty cache");
        return Ok(HashMap::new());
    }

    let json = std::fs::read_to_string(&cache_file)?;
    let cache: HashMap<String, ImageMetadata> = serde_json::from_str(&json)?;

    info!("Loaded {} cached image metadata entries", cache.len());
    Ok(cache)
}

pub(crate) fn load_cache_metadata(
    config: &GalleryConfig,
) -> Result<CacheMetadata, super::GalleryError> {
    let metadata_file = config.cache_directory.join("cache_metadata.json");

    if !metadata_file.exists() {
        debug!("Cache metadata file not found");
        return Err(super::GalleryError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Cache metadata not found",
        )));
    }

    let json = std::fs::read_to_string(&metadata_file)?;
    let metadata: CacheMetadata = serde_json::from_str(&json)?;

    debug!("Loaded cache metadata: version={}", metadata.version);
    Ok(metadata)
}
