//! Error types for partid-ident
//!
//! `IdentifyError` is the caller-facing taxonomy returned by the
//! orchestrator. `ApiError` maps it (and the lower layers) onto HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::capture::{CaptureError, DeviceError};
use crate::ledger::LedgerError;
use crate::recognition::RecognitionError;

/// Identification failure, returned as a discriminated outcome
///
/// An `Uncertain` answer is not an error; see `IdentifyOutcome`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifyError {
    /// Camera denied or absent; fall back to file upload
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// Uploaded file is not an image
    #[error("invalid file: {0}")]
    InvalidFile(String),

    /// No confirmed image to identify
    #[error("no confirmed image: {0}")]
    NoImage(String),

    /// Network or service failure; retry is up to the user
    #[error("recognition service unreachable: {0}")]
    ServiceUnreachable(String),

    /// Service answered outside its contract
    #[error("malformed recognition response: {0}")]
    MalformedResponse(String),

    /// Identified, but the history write failed
    #[error("identification succeeded but was not saved to history: {0}")]
    Persistence(String),

    /// No signed-in identity to own the record
    #[error("not signed in")]
    SignedOut,
}

impl IdentifyError {
    pub fn code(&self) -> &'static str {
        match self {
            IdentifyError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            IdentifyError::InvalidFile(_) => "INVALID_FILE",
            IdentifyError::NoImage(_) => "NO_IMAGE",
            IdentifyError::ServiceUnreachable(_) => "SERVICE_UNREACHABLE",
            IdentifyError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            IdentifyError::Persistence(_) => "PERSISTENCE_FAILED",
            IdentifyError::SignedOut => "SIGNED_OUT",
        }
    }
}

impl From<RecognitionError> for IdentifyError {
    fn from(err: RecognitionError) -> Self {
        match err {
            RecognitionError::Unreachable(msg) => IdentifyError::ServiceUnreachable(msg),
            RecognitionError::Malformed(msg) => IdentifyError::MalformedResponse(msg),
        }
    }
}

impl From<DeviceError> for IdentifyError {
    fn from(err: DeviceError) -> Self {
        IdentifyError::DeviceUnavailable(err.to_string())
    }
}

impl From<CaptureError> for IdentifyError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::DeviceUnavailable(device) => device.into(),
            CaptureError::InvalidFile(msg) => IdentifyError::InvalidFile(msg),
            transition @ CaptureError::InvalidTransition { .. } => {
                IdentifyError::NoImage(transition.to_string())
            }
        }
    }
}

impl From<LedgerError> for IdentifyError {
    fn from(err: LedgerError) -> Self {
        IdentifyError::Persistence(err.to_string())
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Identify(#[from] IdentifyError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Identify(err) => {
                let status = match err {
                    IdentifyError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    IdentifyError::InvalidFile(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    IdentifyError::NoImage(_) => StatusCode::CONFLICT,
                    IdentifyError::ServiceUnreachable(_) => StatusCode::BAD_GATEWAY,
                    IdentifyError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
                    IdentifyError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    IdentifyError::SignedOut => StatusCode::UNAUTHORIZED,
                };
                (status, err.code())
            }
            ApiError::Capture(err) => match err {
                CaptureError::DeviceUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "DEVICE_UNAVAILABLE")
                }
                CaptureError::InvalidFile(_) => {
                    (StatusCode::UNSUPPORTED_MEDIA_TYPE, "INVALID_FILE")
                }
                CaptureError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION")
                }
            },
            ApiError::Ledger(_) => (StatusCode::INTERNAL_SERVER_ERROR, "LEDGER_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();

        let message = match &self {
            ApiError::BadRequest(msg) | ApiError::Conflict(msg) => msg.clone(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognition_errors_map_to_taxonomy() {
        assert_eq!(
            IdentifyError::from(RecognitionError::Unreachable("timeout".into())),
            IdentifyError::ServiceUnreachable("timeout".into())
        );
        assert_eq!(
            IdentifyError::from(RecognitionError::Malformed("bad".into())),
            IdentifyError::MalformedResponse("bad".into())
        );
    }

    #[test]
    fn test_capture_errors_pass_through() {
        let err = IdentifyError::from(CaptureError::DeviceUnavailable(DeviceError::Busy));
        assert!(matches!(err, IdentifyError::DeviceUnavailable(_)));

        let err = IdentifyError::from(CaptureError::InvalidFile("not an image".into()));
        assert_eq!(err, IdentifyError::InvalidFile("not an image".into()));
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (IdentifyError::SignedOut, StatusCode::UNAUTHORIZED),
            (
                IdentifyError::ServiceUnreachable("x".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                IdentifyError::Persistence("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                IdentifyError::InvalidFile("x".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
