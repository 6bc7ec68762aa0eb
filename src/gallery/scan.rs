use super::{Gallery, GalleryError, ImageEntry, ImageMetadata};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Attempts per image before metadata extraction gives up and the image is
/// skipped for this pass.
const METADATA_RETRY_LIMIT: u32 = 3;

impl Gallery {
    /// Walk the source tree and return every image we can extract metadata
    /// for. Dotfiles, dot-folders and configured ignore folders are skipped.
    pub async fn scan_images(&self) -> Result<Vec<ImageEntry>, GalleryError> {
        let source_root = &self.config.source_directory;
        debug!("Scanning source directory: {:?}", source_root);

        let mut entries = Vec::new();

        let walker = WalkDir::new(source_root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| {
                let Some(name) = entry.file_name().to_str() else {
                    return false;
                };
                if name.starts_with('.') {
                    return false;
                }
                if entry.file_type().is_dir() && self.is_ignored_folder(name) {
                    debug!("Skipping ignored folder: {:?}", entry.path());
                    return false;
                }
                true
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };

            if !self.is_image(file_name) {
                continue;
            }

            let relative_path = match entry.path().strip_prefix(source_root) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };

            let file_metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("Failed to stat {}: {}", relative_path, e);
                    continue;
                }
            };
            let modified = file_metadata
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);

            let metadata = match self
                .get_image_metadata_cached(&relative_path, entry.path(), modified)
                .await
            {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(
                        "Skipping {} after {} metadata attempts: {}",
                        relative_path, METADATA_RETRY_LIMIT, e
                    );
                    continue;
                }
            };

            let slug = super::thumbs::thumbnail_slug(&relative_path);
            let encoded_path = relative_path
                .split('/')
                .map(|segment| urlencoding::encode(segment).into_owned())
                .collect::<Vec<_>>()
                .join("/");

            entries.push(ImageEntry {
                name: file_name.to_string(),
                relative_path: relative_path.clone(),
                source_path: entry.path().to_path_buf(),
                thumbnail_path: self.config.thumbnail_directory().join(&slug),
                image_url: format!("{}/{}", super::IMAGE_ROOT_URL, encoded_path),
                thumbnail_url: format!("{}/{}", super::THUMBNAIL_ROOT_URL, slug),
                dimensions: metadata.dimensions,
                capture_date: metadata.capture_date,
                modified,
            });
        }

        debug!("Scan found {} images", entries.len());
        Ok(entries)
    }

    fn is_ignored_folder(&self, name: &str) -> bool {
        self.config.ignore_folders.iter().any(|f| f == name)
    }

    pub(crate) async fn get_image_metadata_cached(
        &self,
        relative_path: &str,
        full_path: &Path,
        modified: SystemTime,
    ) -> Result<ImageMetadata, GalleryError> {
        {
            let cache = self.metadata_cache.read().await;
            if let Some(metadata) = cache.get(relative_path)
                && metadata.source_modified.is_some_and(|m| m >= modified)
            {
                return Ok(metadata.clone());
            }
        }

        let metadata = self.extract_image_metadata(full_path, modified).await?;
        self.insert_metadata_with_tracking(relative_path.to_string(), metadata.clone())
            .await;

        Ok(metadata)
    }

    pub(crate) async fn extract_image_metadata(
        &self,
        path: &Path,
        modified: SystemTime,
    ) -> Result<ImageMetadata, GalleryError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match image::image_dimensions(path) {
                Ok(dimensions) => {
                    let capture_date = extract_capture_date(path);
                    return Ok(ImageMetadata {
                        dimensions,
                        capture_date,
                        source_modified: Some(modified),
                    });
                }
                Err(e) => {
                    debug!(
                        "Metadata attempt {}/{} failed for {:?}: {}",
                        attempt, METADATA_RETRY_LIMIT, path, e
                    );
                    if attempt >= METADATA_RETRY_LIMIT {
                        return Err(GalleryError::ImageError(e));
                    }
                }
            }
        }
    }
}

fn extract_capture_date(path: &Path) -> Option<SystemTime> {
    let exif = match rexif::parse_file(path) {
        Ok(exif) => exif,
        Err(e) => {
            trace!("No EXIF data for {}: {}", path.display(), e);
            return None;
        }
    };

    // Try different date fields in order of preference
    let date_fields = [
        rexif::ExifTag::DateTimeOriginal,
        rexif::ExifTag::DateTimeDigitized,
        rexif::ExifTag::DateTime,
    ];

    for field in &date_fields {
        if let Some(entry) = exif.entries.iter().find(|e| e.tag == *field)
            && let Some(date) = parse_exif_datetime(&entry.value_more_readable)
        {
            return Some(date);
        }
    }

    None
}

fn parse_exif_datetime(datetime_str: &str) -> Option<SystemTime> {
    // EXIF datetime format: "2005:07:30 07:22:46"
    let formats = ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

    for format in &formats {
        if let Ok(naive_dt) = NaiveDateTime::parse_from_str(datetime_str, format) {
            let datetime_utc = DateTime::<Utc>::from_naive_utc_and_offset(naive_dt, Utc);
            return Some(SystemTime::from(datetime_utc));
        }
    }

    None
}
