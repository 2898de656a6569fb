//! External recognition service boundary
//!
//! The service receives an image, a depth, instruction text and the JSON
//! schema of the expected answer, and returns the raw structured text. It is
//! untrusted: the pipeline re-validates everything it returns.

pub mod contract;
pub mod gemini;

pub use contract::{AdvancedResponse, BasicResponse, ContractResponse, ResponseContract};
pub use gemini::GeminiRecognizer;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AnalysisLevel, ImagePayload};

/// One recognition call
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub image: ImagePayload,
    pub level: AnalysisLevel,
    pub instructions: String,
    pub response_schema: serde_json::Value,
}

/// Recognition service failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    /// Network or service-level failure
    #[error("recognition service unreachable: {0}")]
    Unreachable(String),

    /// Service answered but not in the expected envelope
    #[error("recognition service returned a malformed response: {0}")]
    Malformed(String),
}

/// Recognition service contract
///
/// Called exactly once per identification; implementations must not retry.
#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Service name for logging
    fn name(&self) -> &'static str;

    /// Submit the request and return the raw structured answer text
    async fn recognize(&self, request: RecognitionRequest) -> Result<String, RecognitionError>;
}
