use super::{Gallery, GalleryError, GalleryQuery, ImageEntry};
use image::imageops::FilterType;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Thumbnail cache name derived from the source-relative path: lowercased,
/// with whitespace and path separators replaced by `-`.
pub(crate) fn thumbnail_slug(relative_path: &str) -> String {
    relative_path
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' { '-' } else { c })
        .collect()
}

impl Gallery {
    /// Full refresh pass: scan the source tree, bring the thumbnail cache up
    /// to date and rewrite the cached gallery fragment. Returns the entries
    /// that ended up with a valid thumbnail.
    pub async fn refresh_gallery(&self) -> Result<Vec<ImageEntry>, GalleryError> {
        let start = std::time::Instant::now();

        let entries = self.scan_images().await?;
        let scanned = entries.len();
        let mut valid = self.refresh_thumbnails(entries).await?;

        sort_by_name(&mut valid);

        let fragment = render_tiles(valid.iter());
        let fragment_path = self.config.thumbnail_directory().join("gallery.html");
        tokio::fs::write(&fragment_path, &fragment).await?;

        info!(
            "Gallery refresh: {} scanned, {} with thumbnails, {:.2}s",
            scanned,
            valid.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(valid)
    }

    /// Refresh the fragment and render it with the requested view applied.
    pub async fn gallery_content(&self, query: &GalleryQuery) -> Result<String, GalleryError> {
        let entries = self.refresh_gallery().await?;
        Ok(render_view(entries, query))
    }

    /// Bring the thumbnail cache in sync with the scanned entries. A missing
    /// thumbnail is generated; a stale one is regenerated, and deleted when
    /// regeneration fails so the next pass retries from scratch.
    pub(crate) async fn refresh_thumbnails(
        &self,
        entries: Vec<ImageEntry>,
    ) -> Result<Vec<ImageEntry>, GalleryError> {
        tokio::fs::create_dir_all(self.config.thumbnail_directory()).await?;

        let mut valid = Vec::new();

        for entry in entries {
            match tokio::fs::metadata(&entry.thumbnail_path).await {
                Err(_) => {
                    // Thumbnail doesn't exist, generate it
                    match self.generate_thumbnail(&entry).await {
                        Ok(()) => valid.push(entry),
                        Err(e) => {
                            error!(
                                "Error generating thumbnail from {:?}: {}",
                                entry.source_path, e
                            );
                            // No invalid thumbnail to remove
                        }
                    }
                }
                Ok(thumb_metadata) => {
                    let thumb_modified = thumb_metadata
                        .modified()
                        .unwrap_or(SystemTime::UNIX_EPOCH);

                    if thumb_modified < entry.modified {
                        // Source is newer than the thumbnail, regenerate
                        match self.generate_thumbnail(&entry).await {
                            Ok(()) => valid.push(entry),
                            Err(e) => {
                                error!(
                                    "Error regenerating thumbnail from {:?}: {}",
                                    entry.source_path, e
                                );
                                match tokio::fs::remove_file(&entry.thumbnail_path).await {
                                    Ok(()) => warn!(
                                        "Removed stale thumbnail {:?}",
                                        entry.thumbnail_path
                                    ),
                                    Err(remove_err) => warn!(
                                        "Failed to remove stale thumbnail {:?}: {}",
                                        entry.thumbnail_path, remove_err
                                    ),
                                }
                            }
                        }
                    } else {
                        valid.push(entry);
                    }
                }
            }
        }

        Ok(valid)
    }

    async fn generate_thumbnail(&self, entry: &ImageEntry) -> Result<(), GalleryError> {
        let percentage = self.config.thumbnail_percentage;
        let width = scaled_dimension(entry.dimensions.0, percentage);
        let height = scaled_dimension(entry.dimensions.1, percentage);

        let source_path = entry.source_path.clone();
        let thumbnail_path = entry.thumbnail_path.clone();

        debug!(
            "Generating {}x{} thumbnail for {:?}",
            width, height, source_path
        );

        // Decode and resize on the blocking pool
        tokio::task::spawn_blocking(move || -> Result<(), GalleryError> {
            let source_file = std::fs::File::open(&source_path)?;

            let decoder = image::ImageReader::new(std::io::BufReader::new(source_file))
                .with_guessed_format()?;

            let img = decoder.decode()?;
            let resized = img.resize_exact(width, height, FilterType::Lanczos3);

            // Output format follows the source extension
            resized.save(&thumbnail_path)?;

            Ok(())
        })
        .await
        .map_err(|e| GalleryError::IoError(std::io::Error::other(e)))??;

        Ok(())
    }
}

fn scaled_dimension(original: u32, percentage: u32) -> u32 {
    (((original as f64) * (percentage as f64) / 100.0).round() as u32).max(1)
}

fn sort_by_name(entries: &mut [ImageEntry]) {
    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
}

/// Apply the view parameters and render the tile fragment.
pub(crate) fn render_view(entries: Vec<ImageEntry>, query: &GalleryQuery) -> String {
    let mut entries = entries;

    if let Some(filter) = query.filter.as_deref().filter(|f| !f.is_empty()) {
        let needle = filter.to_lowercase();
        entries.retain(|e| e.relative_path.to_lowercase().contains(&needle));
    }

    match query.sort.as_deref() {
        None | Some("name") => sort_by_name(&mut entries),
        Some("-name") => {
            sort_by_name(&mut entries);
            entries.reverse();
        }
        Some("date") => entries.sort_by_key(|e| e.date_key()),
        Some("-date") => {
            entries.sort_by_key(|e| e.date_key());
            entries.reverse();
        }
        Some(other) => {
            debug!("Unknown sort parameter '{}', using name order", other);
            sort_by_name(&mut entries);
        }
    }

    if let Some(page_size) = query.paginate.filter(|&n| n > 0) {
        let page = query.page.unwrap_or(0);
        let start = page.saturating_mul(page_size);
        let end = start.saturating_add(page_size).min(entries.len());
        if start < entries.len() {
            return render_tiles(entries[start..end].iter());
        }
        return String::new();
    }

    render_tiles(entries.iter())
}

/// One tile per image: the thumbnail img carries the full-size URL in a data
/// attribute the client reads when opening the fullscreen viewer.
pub(crate) fn render_tiles<'a>(entries: impl Iterator<Item = &'a ImageEntry>) -> String {
    let mut html = String::new();
    for entry in entries {
        html.push_str(&format!(
            r#"<div class="image-tile"><img src="{}" data-full-size-image-url="{}"/></div>"#,
            entry.thumbnail_url, entry.image_url
        ));
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    fn entry(relative_path: &str, age_secs: u64) -> ImageEntry {
        let slug = thumbnail_slug(relative_path);
        ImageEntry {
            name: relative_path.rsplit('/').next().unwrap().to_string(),
            relative_path: relative_path.to_string(),
            source_path: PathBuf::from("/photos").join(relative_path),
            thumbnail_path: PathBuf::from("/cache/thumbnails-20").join(&slug),
            image_url: format!("/images/{}", relative_path),
            thumbnail_url: format!("/thumbnails/{}", slug),
            dimensions: (100, 100),
            capture_date: None,
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(age_secs),
        }
    }

    #[test]
    fn slug_lowercases_and_flattens() {
        assert_eq!(
            thumbnail_slug("Vacation 2024/Beach Day/IMG 001.JPG"),
            "vacation-2024-beach-day-img-001.jpg"
        );
        assert_eq!(thumbnail_slug("a.png"), "a.png");
    }

    #[test]
    fn scaled_dimension_rounds_and_never_hits_zero() {
        assert_eq!(scaled_dimension(1000, 20), 200);
        assert_eq!(scaled_dimension(7, 20), 1);
        assert_eq!(scaled_dimension(13, 20), 3); // 2.6 rounds up
    }

    #[test]
    fn tile_fragment_format() {
        let html = render_tiles([entry("b.jpg", 0)].iter());
        assert_eq!(
            html,
            r#"<div class="image-tile"><img src="/thumbnails/b.jpg" data-full-size-image-url="/images/b.jpg"/></div>"#
        );
    }

    #[test]
    fn view_filters_case_insensitively() {
        let entries = vec![entry("trips/Beach.jpg", 0), entry("pets/cat.jpg", 0)];
        let query = GalleryQuery {
            filter: Some("BEACH".to_string()),
            ..Default::default()
        };

        let html = render_view(entries, &query);
        assert!(html.contains("beach.jpg"));
        assert!(!html.contains("cat.jpg"));
    }

    #[test]
    fn view_sorts_by_date_descending() {
        let entries = vec![entry("old.jpg", 100), entry("new.jpg", 200)];
        let query = GalleryQuery {
            sort: Some("-date".to_string()),
            ..Default::default()
        };

        let html = render_view(entries, &query);
        let new_pos = html.find("new.jpg").unwrap();
        let old_pos = html.find("old.jpg").unwrap();
        assert!(new_pos < old_pos);
    }

    #[test]
    fn view_paginates_and_clamps() {
        let entries: Vec<_> = (0..5).map(|i| entry(&format!("img{}.jpg", i), 0)).collect();

        let query = GalleryQuery {
            paginate: Some(2),
            page: Some(1),
            ..Default::default()
        };
        let html = render_view(entries.clone(), &query);
        assert!(html.contains("img2.jpg"));
        assert!(html.contains("img3.jpg"));
        assert!(!html.contains("img0.jpg"));
        assert!(!html.contains("img4.jpg"));

        let past_end = GalleryQuery {
            paginate: Some(2),
            page: Some(10),
            ..Default::default()
        };
        assert_eq!(render_view(entries, &past_end), "");
    }

    #[test]
    fn unknown_sort_falls_back_to_name_order() {
        let entries = vec![entry("b.jpg", 0), entry("a.jpg", 0)];
        let query = GalleryQuery {
            sort: Some("bogus".to_string()),
            ..Default::default()
        };

        let html = render_view(entries, &query);
        assert!(html.find("a.jpg").unwrap() < html.find("b.jpg").unwrap());
    }
}
