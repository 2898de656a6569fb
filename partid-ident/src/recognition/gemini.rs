//! Gemini recognition client
//!
//! Sends the image inline (base64) together with the instruction text and
//! the structured-output schema to `models/{model}:generateContent`, and
//! returns the concatenated text of the first candidate.
//!
//! # API Reference
//! - Endpoint: {endpoint}/models/{model}:generateContent
//! - Auth: `x-goog-api-key` header

use async_trait::async_trait;
use partid_common::config::RecognitionConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{RecognitionError, RecognitionRequest, RecognitionService};

/// Gemini client
pub struct GeminiRecognizer {
    http_client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiRecognizer {
    pub fn new(config: &RecognitionConfig, api_key: String) -> Result<Self, RecognitionError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                RecognitionError::Unreachable(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            api_key,
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl RecognitionService for GeminiRecognizer {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn recognize(&self, request: RecognitionRequest) -> Result<String, RecognitionError> {
        let body = build_request_body(&request);

        debug!(
            model = %self.model,
            level = %request.level.as_str(),
            image_bytes = request.image.len(),
            "Submitting recognition request"
        );

        let response = self
            .http_client
            .post(self.request_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RecognitionError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = %status, "Recognition service returned an error status");
            return Err(RecognitionError::Unreachable(format!(
                "HTTP {}: {}",
                status,
                truncate(&detail, 200)
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| RecognitionError::Malformed(format!("invalid envelope: {}", e)))?;

        extract_text(parsed)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

fn build_request_body(request: &RecognitionRequest) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![
                RequestPart::InlineData {
                    inline_data: InlineData {
                        mime_type: request.image.format().mime().to_string(),
                        data: request.image.to_base64(),
                    },
                },
                RequestPart::Text {
                    text: request.instructions.clone(),
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: request.response_schema.clone(),
        },
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn extract_text(response: GenerateContentResponse) -> Result<String, RecognitionError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(RecognitionError::Malformed(reason));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        return Err(RecognitionError::Malformed(
            "candidate carried no text".to_string(),
        ));
    }
    Ok(text)
}
