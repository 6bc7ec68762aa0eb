use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// One scanned source image, with everything the thumbnail refresh and
/// fragment rendering need.
#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub name: String,
    /// Path relative to the gallery source directory, `/`-separated.
    pub relative_path: String,
    pub source_path: PathBuf,
    pub thumbnail_path: PathBuf,
    pub image_url: String,
    pub thumbnail_url: String,
    pub dimensions: (u32, u32),
    pub capture_date: Option<SystemTime>,
    pub modified: SystemTime,
}

impl ImageEntry {
    /// Sort key for `sort=date`: EXIF capture date when present, otherwise
    /// the file modification time.
    pub fn date_key(&self) -> SystemTime {
        self.capture_date.unwrap_or(self.modified)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GalleryQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub paginate: Option<usize>,
    pub page: Option<usize>,
    /// Client-side column count. Accepted so view URLs round-trip, but layout
    /// is the client's concern and it is not applied here.
    pub cols: Option<u32>,
}

// Internal types

#[derive(Serialize, Deserialize)]
pub(crate) struct CacheMetadata {
    pub version: String,
    pub last_full_refresh: SystemTime,
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct ImageMetadata {
    pub dimensions: (u32, u32),
    pub capture_date: Option<SystemTime>,
    /// Source mtime at extraction time; a newer source invalidates the entry.
    pub source_modified: Option<SystemTime>,
}
