use crate::Config;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Failed to create cache directory: {0}")]
    CacheDirectoryCreationFailed(#[from] std::io::Error),

    #[error("Static files directory does not exist")]
    StaticDirectoryMissing,

    #[error("Gallery source directory does not exist: {0}")]
    SourceDirectoryMissing(String),
}

pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    // Cache directories (metadata cache, thumbnails, pending edits)
    for cache_dir in [
        config.gallery.cache_directory.clone(),
        config.gallery.thumbnail_directory(),
        config.gallery.edits_directory(),
    ] {
        if !cache_dir.exists() {
            info!("Cache directory does not exist, creating: {:?}", cache_dir);
            if let Err(e) = tokio::fs::create_dir_all(&cache_dir).await {
                error!("Failed to create cache directory {:?}: {}", cache_dir, e);
                errors.push(StartupCheckError::CacheDirectoryCreationFailed(e));
            }
        } else {
            info!("Cache directory exists: {:?}", cache_dir);
        }
    }

    // Gallery source directory
    let source_dir = Path::new(&config.gallery.source_directory);
    if !source_dir.exists() {
        error!("Gallery source directory does not exist: {:?}", source_dir);
        errors.push(StartupCheckError::SourceDirectoryMissing(
            source_dir.display().to_string(),
        ));
    } else {
        match tokio::fs::read_dir(source_dir).await {
            Ok(_) => info!("Gallery source directory is accessible: {:?}", source_dir),
            Err(e) => {
                error!("Gallery source directory is not accessible: {}", e);
                errors.push(StartupCheckError::SourceDirectoryMissing(
                    source_dir.display().to_string(),
                ));
            }
        }
    }

    // Static files directory
    let static_dir = Path::new(&config.static_files.directory);
    if !static_dir.exists() {
        warn!("Static files directory does not exist: {:?}", static_dir);
        errors.push(StartupCheckError::StaticDirectoryMissing);
    } else {
        info!("Static files directory exists: {:?}", static_dir);
    }

    // Templates directory
    let templates_dir = Path::new(&config.templates.directory);
    if !templates_dir.exists() {
        warn!("Templates directory does not exist: {:?}", templates_dir);
        warn!("This may cause issues with page rendering");
    } else {
        info!("Templates directory exists: {:?}", templates_dir);
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}
