//! File selection / drag-and-drop path
//!
//! A supplied file must declare an `image/*` content type. The bytes are
//! also sniffed: a payload recognized as some other kind of file is
//! rejected even when its declared type claims to be an image.

use infer::MatcherType;
use tracing::debug;

use crate::models::{ImageFormat, ImagePayload};

/// A user-supplied file
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: None,
            content_type,
            bytes,
        }
    }
}

/// Validate an upload into an image payload
///
/// Returns a user-facing rejection message on failure.
pub fn validate_upload(file: UploadedFile) -> Result<ImagePayload, String> {
    let declared = file
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .ok_or_else(|| "File does not declare a content type".to_string())?;

    let declared_format = ImageFormat::from_mime(declared)
        .ok_or_else(|| format!("File is not an image (declared type {})", declared))?;

    if file.bytes.is_empty() {
        return Err("File is empty".to_string());
    }

    let format = match infer::get(&file.bytes) {
        Some(kind) if kind.matcher_type() != MatcherType::Image => {
            return Err(format!(
                "File content is {} but was declared as {}",
                kind.mime_type(),
                declared
            ));
        }
        // Sniffed encoding wins over the declared subtype
        Some(kind) => ImageFormat::from_mime(kind.mime_type()).unwrap_or(declared_format),
        None => declared_format,
    };

    debug!(
        file_name = ?file.file_name,
        format = %format,
        size = file.bytes.len(),
        "Upload accepted"
    );

    ImagePayload::new(format, file.bytes).map_err(|e| e.to_string())
}
