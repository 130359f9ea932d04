//! Screenshot upload handling
//!
//! Uploaded screenshots are validated, flattened to RGB and re-encoded as
//! JPEG before they are attached to a model request.

use crate::core::constants::mime;
use crate::models::gemini::{Blob, Part};
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Unsupported image type: {0} (expected jpg, jpeg or png)")]
    UnsupportedType(String),

    #[error("Image is {size} bytes, larger than the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("Uploaded file is empty")]
    Empty,

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),
}

/// A normalized screenshot ready to send to the model
#[derive(Debug, Clone)]
pub struct ImageInput {
    /// JPEG bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub file_name: Option<String>,
}

impl ImageInput {
    /// Validate and normalize an uploaded file
    ///
    /// The type is taken from the declared content type, falling back to
    /// the file extension; PNG and JPEG are the only accepted formats.
    pub fn from_upload(
        bytes: &[u8],
        content_type: Option<&str>,
        file_name: Option<&str>,
        max_bytes: usize,
    ) -> Result<Self, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }

        if bytes.len() > max_bytes {
            return Err(ImageError::TooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }

        let format = detect_format(content_type, file_name)?;

        let decoded = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| ImageError::Decode(e.to_string()))?;

        let (width, height) = (decoded.width(), decoded.height());
        let data = encode_jpeg(decoded)?;

        Ok(Self {
            data,
            width,
            height,
            file_name: file_name.map(str::to_string),
        })
    }

    pub fn mime_type(&self) -> &'static str {
        mime::JPEG
    }

    /// Inline-data part carrying the base64 encoded JPEG
    pub fn to_part(&self) -> Part {
        Part::InlineData {
            inline_data: Blob {
                mime_type: mime::JPEG.to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(&self.data),
            },
        }
    }
}

fn detect_format(
    content_type: Option<&str>,
    file_name: Option<&str>,
) -> Result<ImageFormat, ImageError> {
    let declared = content_type
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");

    if let Some(ct) = declared {
        return match ct.as_str() {
            mime::JPEG | "image/jpg" | "image/pjpeg" => Ok(ImageFormat::Jpeg),
            mime::PNG => Ok(ImageFormat::Png),
            other => Err(ImageError::UnsupportedType(other.to_string())),
        };
    }

    let extension = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        let shown = if extension.is_empty() {
            "unknown".to_string()
        } else {
            extension
        };
        return Err(ImageError::UnsupportedType(shown));
    }

    Ok(if extension == "png" {
        ImageFormat::Png
    } else {
        ImageFormat::Jpeg
    })
}

/// JPEG has no alpha channel, so everything is flattened to RGB first
fn encode_jpeg(image: DynamicImage) -> Result<Vec<u8>, ImageError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes() -> Vec<u8> {
        let img = RgbaImage::from_pixel(4, 3, Rgba([200, 10, 10, 128]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_rgba_png_becomes_jpeg() {
        let input =
            ImageInput::from_upload(&png_bytes(), Some("image/png"), Some("ui.png"), 1 << 20)
                .unwrap();
        assert_eq!((input.width, input.height), (4, 3));
        assert_eq!(&input.data[..2], &[0xFF, 0xD8]);
        assert_eq!(input.mime_type(), "image/jpeg");
    }

    #[test]
    fn test_extension_fallback() {
        let input = ImageInput::from_upload(
            &png_bytes(),
            Some("application/octet-stream"),
            Some("SCREEN.PNG"),
            1 << 20,
        )
        .unwrap();
        assert_eq!(input.file_name.as_deref(), Some("SCREEN.PNG"));
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let err = ImageInput::from_upload(b"GIF89a", Some("image/gif"), None, 1 << 20).unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedType(t) if t == "image/gif"));

        let err = ImageInput::from_upload(b"data", None, Some("notes.txt"), 1 << 20).unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedType(_)));
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        assert!(matches!(
            ImageInput::from_upload(&[], Some("image/png"), None, 10),
            Err(ImageError::Empty)
        ));
        assert!(matches!(
            ImageInput::from_upload(&png_bytes(), Some("image/png"), None, 10),
            Err(ImageError::TooLarge { limit: 10, .. })
        ));
    }

    #[test]
    fn test_rejects_corrupt_data() {
        let err =
            ImageInput::from_upload(b"not a png", Some("image/png"), None, 1 << 20).unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));
    }

    #[test]
    fn test_to_part_is_base64_jpeg() {
        let input =
            ImageInput::from_upload(&png_bytes(), Some("image/png"), None, 1 << 20).unwrap();
        match input.to_part() {
            Part::InlineData { inline_data } => {
                assert_eq!(inline_data.mime_type, "image/jpeg");
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(inline_data.data)
                    .unwrap();
                assert_eq!(decoded, input.data);
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }
}
