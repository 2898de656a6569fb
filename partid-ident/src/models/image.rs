//! Still-image payloads
//!
//! An `ImagePayload` is immutable once built. The bytes sit behind an `Arc`
//! so the record retaining the image for display shares the same buffer
//! instead of copying it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Encoding of a still image
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
    Bmp,
    Heif,
    /// Any other `image/*` subtype, stored as the full MIME type
    Other(String),
}

impl ImageFormat {
    /// Parse a MIME type (parameters such as `; charset=` are ignored)
    ///
    /// Returns `None` for anything outside the `image/` top-level type.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let subtype = essence.strip_prefix("image/")?;
        if subtype.is_empty() {
            return None;
        }

        Some(match subtype {
            "jpeg" | "jpg" | "pjpeg" => ImageFormat::Jpeg,
            "png" => ImageFormat::Png,
            "webp" => ImageFormat::Webp,
            "gif" => ImageFormat::Gif,
            "bmp" | "x-ms-bmp" => ImageFormat::Bmp,
            "heif" | "heic" => ImageFormat::Heif,
            _ => ImageFormat::Other(essence),
        })
    }

    /// MIME type for this format
    pub fn mime(&self) -> &str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Heif => "image/heif",
            ImageFormat::Other(mime) => mime,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// Error building an image payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("not an image content type: {0}")]
    NotAnImage(String),

    #[error("image payload is empty")]
    Empty,

    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),
}

/// A single encoded still image
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    format: ImageFormat,
    bytes: Arc<[u8]>,
}

impl ImagePayload {
    /// Build a payload from encoded bytes
    pub fn new(format: ImageFormat, bytes: impl Into<Arc<[u8]>>) -> Result<Self, ImageError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        Ok(Self { format, bytes })
    }

    /// Build a payload from bytes and a declared MIME type
    pub fn from_mime(mime: &str, bytes: impl Into<Arc<[u8]>>) -> Result<Self, ImageError> {
        let format =
            ImageFormat::from_mime(mime).ok_or_else(|| ImageError::NotAnImage(mime.to_string()))?;
        Self::new(format, bytes)
    }

    /// Parse a `data:<mime>;base64,<payload>` URL
    pub fn from_data_url(data_url: &str) -> Result<Self, ImageError> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or_else(|| ImageError::InvalidDataUrl("missing data: scheme".to_string()))?;
        let (header, encoded) = rest
            .split_once(',')
            .ok_or_else(|| ImageError::InvalidDataUrl("missing ',' separator".to_string()))?;
        let mime = header.strip_suffix(";base64").ok_or_else(|| {
            ImageError::InvalidDataUrl("only base64 data URLs are supported".to_string())
        })?;

        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ImageError::InvalidDataUrl(e.to_string()))?;
        Self::from_mime(mime, bytes)
    }

    /// Encode as a `data:` URL
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime(), self.to_base64())
    }

    /// Base64 of the raw bytes (no data URL prefix)
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn format(&self) -> &ImageFormat {
        &self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

// JSON form is the data URL
impl Serialize for ImagePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for ImagePayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let data_url = String::deserialize(deserializer)?;
        ImagePayload::from_data_url(&data_url).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_mime() {
        assert_eq!(ImageFormat::from_mime("image/jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_mime("IMAGE/PNG; q=1"), Some(ImageFormat::Png));
        assert_eq!(
            ImageFormat::from_mime("image/avif"),
            Some(ImageFormat::Other("image/avif".to_string()))
        );
        assert_eq!(ImageFormat::from_mime("application/pdf"), None);
        assert_eq!(ImageFormat::from_mime("image/"), None);
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert_eq!(
            ImagePayload::new(ImageFormat::Png, Vec::new()).unwrap_err(),
            ImageError::Empty
        );
    }

    #[test]
    fn test_data_url_parsing() {
        let payload = ImagePayload::from_data_url("data:image/jpeg;base64,/9j/4AA=").unwrap();
        assert_eq!(payload.format(), &ImageFormat::Jpeg);
        assert_eq!(payload.bytes(), &[0xFF, 0xD8, 0xFF, 0xE0, 0x00]);
        assert_eq!(payload.to_data_url(), "data:image/jpeg;base64,/9j/4AA=");
    }

    #[test]
    fn test_data_url_rejects_non_image() {
        let err = ImagePayload::from_data_url("data:text/plain;base64,aGk=").unwrap_err();
        assert!(matches!(err, ImageError::NotAnImage(_)));

        let err = ImagePayload::from_data_url("image/png;base64,aGk=").unwrap_err();
        assert!(matches!(err, ImageError::InvalidDataUrl(_)));
    }

    #[test]
    fn test_debug_omits_bytes() {
        let payload = ImagePayload::new(ImageFormat::Png, vec![1u8; 64]).unwrap();
        let debug = format!("{:?}", payload);
        assert!(debug.contains("len: 64"));
    }
}
