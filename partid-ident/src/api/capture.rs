//! Capture session control
//!
//! One capture session is held at a time. `start` replaces a previous
//! session (cancelling it first, which frees the camera); `confirm` hands
//! the frozen frame to the orchestrator for identification.

use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::LevelQuery;
use crate::capture::{CapturePhase, CaptureSession};
use crate::error::{ApiError, ApiResult};
use crate::pipeline::IdentifyOutcome;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CaptureStatus {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub phase: CapturePhase,
    /// Frozen frame as a data URL, while awaiting confirm or retake
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl CaptureStatus {
    fn of(session: &CaptureSession) -> Self {
        Self {
            session_id: session.session_id(),
            phase: session.phase(),
            preview: session.preview().map(|image| image.to_data_url()),
        }
    }
}

fn no_session() -> ApiError {
    ApiError::Conflict("no capture session; call /capture/start first".to_string())
}

/// POST /capture/start
pub async fn start(State(state): State<AppState>) -> ApiResult<Json<CaptureStatus>> {
    let mut slot = state.capture.lock().await;
    if let Some(mut previous) = slot.take() {
        debug!(session_id = %previous.session_id(), "Replacing capture session");
        previous.cancel();
    }

    let session = slot.insert(state.orchestrator.capture_session());
    session.start().await?;
    Ok(Json(CaptureStatus::of(session)))
}

/// POST /capture/freeze
pub async fn freeze(State(state): State<AppState>) -> ApiResult<Json<CaptureStatus>> {
    let mut slot = state.capture.lock().await;
    let session = slot.as_mut().ok_or_else(no_session)?;
    session.freeze().await?;
    Ok(Json(CaptureStatus::of(session)))
}

/// POST /capture/retake
pub async fn retake(State(state): State<AppState>) -> ApiResult<Json<CaptureStatus>> {
    let mut slot = state.capture.lock().await;
    let session = slot.as_mut().ok_or_else(no_session)?;
    session.retake().await?;
    Ok(Json(CaptureStatus::of(session)))
}

/// POST /capture/cancel
pub async fn cancel(State(state): State<AppState>) -> ApiResult<Json<CaptureStatus>> {
    let mut slot = state.capture.lock().await;
    let session = slot.as_mut().ok_or_else(no_session)?;
    session.cancel();
    Ok(Json(CaptureStatus::of(session)))
}

/// POST /capture/confirm?level=
///
/// The session lock is released before the recognition call.
pub async fn confirm(
    State(state): State<AppState>,
    Query(query): Query<LevelQuery>,
) -> ApiResult<Json<IdentifyOutcome>> {
    let image = {
        let mut slot = state.capture.lock().await;
        let session = slot.as_mut().ok_or_else(no_session)?;
        session.confirm()?
    };

    let outcome = state.orchestrator.identify(image, query.level).await?;
    Ok(Json(outcome))
}

pub fn capture_routes() -> Router<AppState> {
    Router::new()
        .route("/capture/start", post(start))
        .route("/capture/freeze", post(freeze))
        .route("/capture/retake", post(retake))
        .route("/capture/cancel", post(cancel))
        .route("/capture/confirm", post(confirm))
}
