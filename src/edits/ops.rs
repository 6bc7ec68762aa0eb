use super::EditError;
use image::{DynamicImage, RgbImage};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditOperation {
    Rotate,
    Greyscale,
    Histogram,
}

/// Apply an edit operation to a decoded image.
pub fn apply(
    img: DynamicImage,
    operation: EditOperation,
    rotation: Option<i32>,
) -> Result<DynamicImage, EditError> {
    match operation {
        EditOperation::Rotate => {
            let degrees = normalize_rotation(rotation.unwrap_or(0))?;
            Ok(match degrees {
                0 => img,
                90 => img.rotate90(),
                180 => img.rotate180(),
                270 => img.rotate270(),
                _ => unreachable!("normalize_rotation only returns quarter turns"),
            })
        }
        EditOperation::Greyscale => Ok(img.grayscale()),
        EditOperation::Histogram => Ok(equalize(img)),
    }
}

/// Map an arbitrary degree count onto {0, 90, 180, 270}, accepting negative
/// values (counterclockwise turns).
fn normalize_rotation(degrees: i32) -> Result<u32, EditError> {
    if degrees % 90 != 0 {
        return Err(EditError::UnsupportedRotation(degrees));
    }
    Ok(degrees.rem_euclid(360) as u32)
}

/// Histogram equalization. Greyscale images go through imageproc directly;
/// color images get a per-channel cumulative-histogram remap.
fn equalize(img: DynamicImage) -> DynamicImage {
    if let DynamicImage::ImageLuma8(gray) = &img {
        return DynamicImage::ImageLuma8(imageproc::contrast::equalize_histogram(gray));
    }

    DynamicImage::ImageRgb8(equalize_rgb(&img.to_rgb8()))
}

fn equalize_rgb(image: &RgbImage) -> RgbImage {
    let cumulative = imageproc::stats::cumulative_histogram(image);
    let total = (image.width() as u64) * (image.height() as u64);

    let luts: Vec<[u8; 256]> = cumulative
        .channels
        .iter()
        .map(|channel| channel_lut(channel, total))
        .collect();

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for (value, lut) in pixel.0.iter_mut().zip(&luts) {
            *value = lut[*value as usize];
        }
    }
    out
}

fn channel_lut(cumulative: &[u32; 256], total: u64) -> [u8; 256] {
    let cdf_min = cumulative.iter().copied().find(|&c| c > 0).unwrap_or(0) as u64;
    let denom = total.saturating_sub(cdf_min);

    let mut lut = [0u8; 256];
    for (value, entry) in lut.iter_mut().enumerate() {
        if denom == 0 {
            // Flat channel, nothing to equalize
            *entry = value as u8;
        } else {
            let cdf = (cumulative[value] as u64).saturating_sub(cdf_min);
            *entry = ((cdf * 255 + denom / 2) / denom) as u8;
        }
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn rotation_normalization() {
        assert_eq!(normalize_rotation(0).unwrap(), 0);
        assert_eq!(normalize_rotation(90).unwrap(), 90);
        assert_eq!(normalize_rotation(450).unwrap(), 90);
        assert_eq!(normalize_rotation(-90).unwrap(), 270);
        assert_eq!(normalize_rotation(-270).unwrap(), 90);
        assert!(matches!(
            normalize_rotation(45),
            Err(EditError::UnsupportedRotation(45))
        ));
    }

    #[test]
    fn rotate_swaps_dimensions() {
        let img = DynamicImage::new_rgb8(4, 2);
        let rotated = apply(img, EditOperation::Rotate, Some(90)).unwrap();
        assert_eq!((rotated.width(), rotated.height()), (2, 4));
    }

    #[test]
    fn rotate_counterclockwise_full_turn_is_identity_size() {
        let img = DynamicImage::new_rgb8(4, 2);
        let rotated = apply(img, EditOperation::Rotate, Some(-360)).unwrap();
        assert_eq!((rotated.width(), rotated.height()), (4, 2));
    }

    #[test]
    fn greyscale_collapses_channels() {
        let mut rgb = RgbImage::new(2, 2);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        let out = apply(DynamicImage::ImageRgb8(rgb), EditOperation::Greyscale, None).unwrap();
        assert_eq!(out.color().channel_count(), 1);
    }

    #[test]
    fn equalize_stretches_narrow_range() {
        // Two-level image clustered mid-range should spread to the extremes
        let mut img = image::GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([100]));
        img.put_pixel(1, 0, Luma([110]));

        let out = apply(
            DynamicImage::ImageLuma8(img),
            EditOperation::Histogram,
            None,
        )
        .unwrap();
        let out = out.to_luma8();
        let (low, high) = (out.get_pixel(0, 0)[0], out.get_pixel(1, 0)[0]);
        assert!(low < high);
        assert!(high > 200, "expected stretch towards white, got {}", high);
    }

    #[test]
    fn equalize_rgb_is_identity_on_flat_image() {
        let img = RgbImage::from_pixel(3, 3, Rgb([42, 42, 42]));
        let out = equalize_rgb(&img);
        assert_eq!(out.get_pixel(1, 1), &Rgb([42, 42, 42]));
    }
}
