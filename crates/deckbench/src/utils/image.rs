//! Image preparation for remote vision endpoints.
//!
//! Images are decoded, downscaled so the longest edge is at most
//! [`MAX_EDGE`] pixels (Lanczos3), re-encoded as PNG and base64-encoded.

use crate::error::{DeckbenchError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// Longest edge sent to remote endpoints.
pub const MAX_EDGE: u32 = 2048;

/// Media type of every [`EncodedImage`].
pub const PNG_MEDIA_TYPE: &str = "image/png";

/// Base64 PNG payload ready for an API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: String,
    pub media_type: &'static str,
}

impl EncodedImage {
    /// `data:` URL as used by OpenAI-compatible chat endpoints.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// Downscale and encode raw image bytes.
pub fn encode_image_bytes(bytes: &[u8], max_edge: u32) -> Result<EncodedImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DeckbenchError::image_processing_with_source("Failed to read image format", e))?;

    let mut img = reader.decode()?;

    let (width, height) = (img.width(), img.height());
    let longest = width.max(height);
    if longest > max_edge {
        let ratio = max_edge as f64 / longest as f64;
        let new_width = ((width as f64 * ratio) as u32).max(1);
        let new_height = ((height as f64 * ratio) as u32).max(1);
        tracing::debug!("Resizing image {}x{} -> {}x{}", width, height, new_width, new_height);
        img = img.resize_exact(new_width, new_height, FilterType::Lanczos3);
    }

    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(EncodedImage {
        data: STANDARD.encode(&png),
        media_type: PNG_MEDIA_TYPE,
    })
}

/// Read, downscale and encode an image file.
///
/// # Errors
///
/// `NotFound` if the file does not exist, `ImageProcessing` if it cannot be decoded.
pub async fn encode_image_file(path: &Path) -> Result<EncodedImage> {
    if !path.exists() {
        return Err(DeckbenchError::not_found("image", path));
    }
    let bytes = tokio::fs::read(path).await?;
    tokio::task::spawn_blocking(move || encode_image_bytes(&bytes, MAX_EDGE))
        .await
        .map_err(|e| DeckbenchError::image_processing(format!("Image encoding task failed: {}", e)))?
}
