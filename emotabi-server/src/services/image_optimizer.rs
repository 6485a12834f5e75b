//! Upload downscaling and the placeholder asset
//!
//! Uploaded photos are shrunk to fit a 320x320 box (aspect preserved) before
//! analysis. Smaller images are left untouched.

use image::imageops::FilterType;
use std::path::Path;

/// Bounding box for stored uploads
pub const MAX_DIMENSION: u32 = 320;

/// Resize the image at `path` in place if it exceeds `max_size`
///
/// Returns `Ok(false)` when the image could not be decoded, `Ok(true)` when
/// it is ready for analysis (resized or already small enough).
pub fn optimize_image(path: &Path, max_size: (u32, u32)) -> std::io::Result<bool> {
    let decoded = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode();
    let img = match decoded {
        Ok(img) => img,
        Err(image::ImageError::IoError(e)) => return Err(e),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Uploaded image could not be decoded");
            return Ok(false);
        }
    };

    let (w, h) = (img.width(), img.height());
    if w <= max_size.0 && h <= max_size.1 {
        return Ok(true);
    }

    let scale = f64::min(max_size.0 as f64 / w as f64, max_size.1 as f64 / h as f64);
    let new_w = ((w as f64 * scale) as u32).max(1);
    let new_h = ((h as f64 * scale) as u32).max(1);

    let format = image::ImageFormat::from_path(path).unwrap_or(image::ImageFormat::Png);
    let mut resized = img.resize_exact(new_w, new_h, FilterType::Triangle);
    if format == image::ImageFormat::Jpeg {
        // JPEG has no alpha channel
        resized = image::DynamicImage::ImageRgb8(resized.to_rgb8());
    }
    if let Err(e) = resized.save_with_format(path, format) {
        // Keep analysing the original rather than failing the request
        tracing::warn!(path = %path.display(), error = %e, "Resized image could not be written");
    }
    Ok(true)
}

/// Placeholder photo dimensions
pub const PLACEHOLDER_SIZE: (u32, u32) = (400, 300);

/// Write a plain placeholder PNG at `path` unless one already exists
///
/// Returns `true` when a new file was written.
pub fn ensure_placeholder(path: &Path) -> image::ImageResult<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let (w, h) = PLACEHOLDER_SIZE;
    let img = image::RgbImage::from_fn(w, h, |x, y| {
        // soft diagonal gradient so the card is not a flat grey block
        let shade = 215 + ((x + y) * 25 / (w + h)) as u8;
        image::Rgb([shade, shade - 6, shade - 14])
    });
    img.save_with_format(path, image::ImageFormat::Png)?;
    tracing::info!(path = %path.display(), "Generated placeholder image");
    Ok(true)
}
