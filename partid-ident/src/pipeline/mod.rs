//! Identification pipeline
//!
//! One `identify` call makes exactly one recognition request:
//!
//! 1. Select the response contract for the requested depth
//! 2. Submit image + instructions + schema (the only suspension point)
//! 3. Parse per contract; a contract violation is `MalformedResponse`
//! 4. `Uncertain` short-circuits into an explanation, no record is built
//! 5. Validate required fields and normalize to the canonical shape
//! 6. Mint id and creation time, attach owner and image
//!
//! Nothing is retried here. Cancelling the token before the service
//! answers yields `Discarded`.

pub mod normalize;

pub use normalize::RecordFields;

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::IdentifyError;
use crate::ledger::RecordIdMinter;
use crate::models::{AnalysisLevel, ComponentRecord, Confidence, Identity, ImagePayload};
use crate::recognition::{RecognitionRequest, RecognitionService, ResponseContract};

/// Explanation used when the service reports `Uncertain` without one
pub const DEFAULT_UNCERTAIN_EXPLANATION: &str =
    "Could not confidently identify the component. Please try again with a clearer image.";

/// Result of a completed (non-failed) identification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IdentifyOutcome {
    /// Component identified; the record is ready for the ledger
    Identified { record: ComponentRecord },

    /// Valid "could not identify" answer; never persisted
    Uncertain { explanation: String },

    /// Caller abandoned the call before it resolved
    Discarded,
}

impl IdentifyOutcome {
    pub fn record(&self) -> Option<&ComponentRecord> {
        match self {
            IdentifyOutcome::Identified { record } => Some(record),
            _ => None,
        }
    }
}

pub struct IdentificationPipeline {
    service: Arc<dyn RecognitionService>,
    minter: Arc<RecordIdMinter>,
}

impl IdentificationPipeline {
    pub fn new(service: Arc<dyn RecognitionService>, minter: Arc<RecordIdMinter>) -> Self {
        Self { service, minter }
    }

    pub fn service_name(&self) -> &'static str {
        self.service.name()
    }

    /// Identify the component in `image` on behalf of `owner`
    pub async fn identify(
        &self,
        image: ImagePayload,
        level: AnalysisLevel,
        owner: &Identity,
        cancel: &CancellationToken,
    ) -> Result<IdentifyOutcome, IdentifyError> {
        let contract = ResponseContract::for_level(level);
        let request = RecognitionRequest {
            image: image.clone(),
            level,
            instructions: contract.instructions().to_string(),
            response_schema: contract.response_schema(),
        };

        info!(
            owner = %owner,
            level = %level,
            service = self.service.name(),
            image_bytes = image.len(),
            "Identification started"
        );
        let started = Instant::now();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(owner = %owner, "Identification cancelled before the service answered");
                return Ok(IdentifyOutcome::Discarded);
            }
            response = self.service.recognize(request) => response,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let raw = response.map_err(|e| {
            warn!(owner = %owner, elapsed_ms, error = %e, "Recognition call failed");
            IdentifyError::from(e)
        })?;
        debug!(elapsed_ms, response_len = raw.len(), "Recognition call returned");

        let outcome = self.interpret(&contract, &raw, image, owner)?;
        match &outcome {
            IdentifyOutcome::Identified { record } => info!(
                owner = %owner,
                record_id = %record.id,
                name = %record.name,
                confidence = %record.confidence,
                elapsed_ms,
                "Component identified"
            ),
            IdentifyOutcome::Uncertain { .. } => {
                info!(owner = %owner, elapsed_ms, "Component could not be identified")
            }
            IdentifyOutcome::Discarded => {}
        }
        Ok(outcome)
    }

    /// Validate and normalize a raw answer (steps 3 to 6)
    pub fn interpret(
        &self,
        contract: &ResponseContract,
        raw: &str,
        image: ImagePayload,
        owner: &Identity,
    ) -> Result<IdentifyOutcome, IdentifyError> {
        let parsed = contract.parse(raw).map_err(|e| {
            warn!(level = %contract.level(), error = %e, "Recognition answer violated its contract");
            IdentifyError::MalformedResponse(e)
        })?;

        if parsed.confidence() == Confidence::Uncertain {
            let explanation = parsed.common_usage().trim();
            let explanation = if explanation.is_empty() {
                DEFAULT_UNCERTAIN_EXPLANATION.to_string()
            } else {
                explanation.to_string()
            };
            return Ok(IdentifyOutcome::Uncertain { explanation });
        }

        let fields = normalize::normalize(parsed);
        if let Some(field) = fields.missing_required() {
            return Err(IdentifyError::MalformedResponse(format!(
                "required field '{}' is empty",
                field
            )));
        }

        let (id, created_at) = self.minter.mint();
        let record = ComponentRecord {
            id,
            owner_id: owner.clone(),
            name: fields.name,
            category: fields.category,
            description: fields.description,
            manufacturer: fields.manufacturer,
            package_type: fields.package_type,
            application_category: fields.application_category,
            key_features: fields.key_features,
            substitutes: fields.substitutes,
            functional_blocks: fields.functional_blocks,
            pinout: fields.pinout,
            specifications: fields.specifications,
            common_usage: fields.common_usage,
            confidence: fields.confidence,
            datasheet_url: fields.datasheet_url,
            analysis_level: contract.level(),
            image,
            created_at,
        };

        Ok(IdentifyOutcome::Identified { record })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageFormat;
    use crate::recognition::RecognitionError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Canned {
        answer: Result<String, RecognitionError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecognitionService for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn recognize(&self, _request: RecognitionRequest) -> Result<String, RecognitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn pipeline(answer: Result<&str, RecognitionError>) -> (IdentificationPipeline, Arc<Canned>) {
        let canned = Arc::new(Canned {
            answer: answer.map(str::to_string),
            calls: AtomicUsize::new(0),
        });
        (
            IdentificationPipeline::new(canned.clone(), Arc::new(RecordIdMinter::new())),
            canned,
        )
    }

    fn image() -> ImagePayload {
        ImagePayload::new(ImageFormat::Jpeg, vec![0xFF, 0xD8, 0xFF, 0xE0]).unwrap()
    }

    fn owner() -> Identity {
        Identity::new("user-1").unwrap()
    }

    #[tokio::test]
    async fn test_identified_record_is_complete() {
        let (pipeline, canned) = pipeline(Ok(
            r#"{"name":"NE555","type":"Timer IC","commonUsage":"Timing circuits","confidence":"High"}"#,
        ));
        let outcome = pipeline
            .identify(image(), AnalysisLevel::Basic, &owner(), &CancellationToken::new())
            .await
            .unwrap();

        let record = outcome.record().unwrap();
        assert_eq!(record.name, "NE555");
        assert_eq!(record.owner_id, owner());
        assert_eq!(record.analysis_level, AnalysisLevel::Basic);
        assert_eq!(record.image, image());
        assert_eq!(canned.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_uncertain_short_circuits_with_default_explanation() {
        let (pipeline, _) = pipeline(Ok(
            r#"{"name":"","type":"","commonUsage":"  ","confidence":"Uncertain"}"#,
        ));
        let outcome = pipeline
            .identify(image(), AnalysisLevel::Basic, &owner(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            IdentifyOutcome::Uncertain {
                explanation: DEFAULT_UNCERTAIN_EXPLANATION.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_blank_name_is_malformed() {
        let (pipeline, _) = pipeline(Ok(
            r#"{"name":"  ","type":"Resistor","commonUsage":"x","confidence":"Low"}"#,
        ));
        let result = pipeline
            .identify(image(), AnalysisLevel::Basic, &owner(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(IdentifyError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_service_failure_is_not_retried() {
        let (pipeline, canned) = pipeline(Err(RecognitionError::Unreachable("down".into())));
        let result = pipeline
            .identify(image(), AnalysisLevel::Advanced, &owner(), &CancellationToken::new())
            .await;
        assert_eq!(result, Err(IdentifyError::ServiceUnreachable("down".into())));
        assert_eq!(canned.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_discards() {
        let (pipeline, _) = pipeline(Ok("{}"));
        let token = CancellationToken::new();
        token.cancel();
        let outcome = pipeline
            .identify(image(), AnalysisLevel::Basic, &owner(), &token)
            .await
            .unwrap();
        assert_eq!(outcome, IdentifyOutcome::Discarded);
    }
}
