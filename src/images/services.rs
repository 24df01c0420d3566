use std::io::Cursor;

use bytes::Bytes;
use image::ImageFormat;
use tracing::debug;
use uuid::Uuid;

use crate::state::AppState;

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const MAX_DIMENSION: u32 = 125;

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error("Only jpg, jpeg and png files are allowed.")]
    UnsupportedType,
    #[error("The uploaded file is not a readable image.")]
    InvalidImage(#[source] image::ImageError),
    #[error("encode resized image")]
    Encode(#[source] image::ImageError),
    #[error(transparent)]
    Storage(anyhow::Error),
}

impl AvatarError {
    /// Caller fault (bad upload) as opposed to a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnsupportedType | Self::InvalidImage(_))
    }
}

fn extension_of(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Validates and downsizes an uploaded avatar without touching storage.
/// Returns the generated filename and the encoded bytes. The filename is
/// random so uploads can never collide or traverse paths; only the
/// extension survives from the original name.
pub fn prepare_avatar(data: &[u8], original_filename: &str) -> Result<(String, Vec<u8>), AvatarError> {
    let ext = extension_of(original_filename)
        .filter(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()))
        .ok_or(AvatarError::UnsupportedType)?;

    let img = image::load_from_memory(data).map_err(AvatarError::InvalidImage)?;

    // Shrink-only thumbnail semantics: images already within bounds keep
    // their size.
    let img = if img.width() > MAX_DIMENSION || img.height() > MAX_DIMENSION {
        img.thumbnail(MAX_DIMENSION, MAX_DIMENSION)
    } else {
        img
    };

    let format = ImageFormat::from_extension(&ext).ok_or(AvatarError::UnsupportedType)?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).map_err(AvatarError::Encode)?;

    let filename = format!("{}.{}", Uuid::new_v4().simple(), ext);
    debug!(%filename, width = img.width(), height = img.height(), "avatar prepared");
    Ok((filename, out.into_inner()))
}

/// Full upload path: prepare, persist under the generated name, return the
/// name for the caller to commit onto the user row.
pub async fn save_avatar(
    state: &AppState,
    data: &[u8],
    original_filename: &str,
) -> Result<String, AvatarError> {
    let (filename, encoded) = prepare_avatar(data, original_filename)?;
    state
        .storage
        .put_object(&filename, Bytes::from(encoded))
        .await
        .map_err(AvatarError::Storage)?;
    Ok(filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([120, 80, 40]),
        ));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn rejects_disallowed_extension_before_decoding() {
        let err = prepare_avatar(b"MZ\x90\x00", "payload.exe").unwrap_err();
        assert!(matches!(err, AvatarError::UnsupportedType));
        let err = prepare_avatar(&png_bytes(10, 10), "noext").unwrap_err();
        assert!(matches!(err, AvatarError::UnsupportedType));
    }

    #[test]
    fn rejects_garbage_bytes_with_image_extension() {
        let err = prepare_avatar(b"definitely not pixels", "fake.png").unwrap_err();
        assert!(matches!(err, AvatarError::InvalidImage(_)));
    }

    #[test]
    fn large_image_is_bounded_and_keeps_aspect_ratio() {
        let (name, encoded) = prepare_avatar(&png_bytes(300, 200), "big.png").unwrap();
        assert!(name.ends_with(".png"));
        let resized = image::load_from_memory(&encoded).unwrap();
        assert!(resized.width() <= MAX_DIMENSION);
        assert!(resized.height() <= MAX_DIMENSION);
        assert_eq!(resized.width(), 125);
        // 200 * 125 / 300, rounded down by the scaler.
        assert!((82..=84).contains(&resized.height()));
    }

    #[test]
    fn small_image_is_not_upscaled() {
        let (_, encoded) = prepare_avatar(&png_bytes(50, 40), "small.png").unwrap();
        let kept = image::load_from_memory(&encoded).unwrap();
        assert_eq!((kept.width(), kept.height()), (50, 40));
    }

    #[test]
    fn generated_names_are_random_and_keep_extension() {
        let (a, _) = prepare_avatar(&png_bytes(10, 10), "me.jpeg").unwrap();
        let (b, _) = prepare_avatar(&png_bytes(10, 10), "me.jpeg").unwrap();
        assert_ne!(a, b);
        assert!(a.ends_with(".jpeg"));
        assert!(!a.contains("me"));
    }
}
