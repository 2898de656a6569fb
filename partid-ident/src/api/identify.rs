//! Identification endpoints
//!
//! `POST /identify` is the file-upload path: the raw request body is the
//! image and `Content-Type` is its declared type.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::LevelQuery;
use crate::capture::UploadedFile;
use crate::error::ApiResult;
use crate::pipeline::IdentifyOutcome;
use crate::AppState;

/// POST /identify?level=
pub async fn identify_upload(
    State(state): State<AppState>,
    Query(query): Query<LevelQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<IdentifyOutcome>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let mut file = UploadedFile::new(content_type, body.to_vec());
    file.file_name = headers
        .get("x-file-name")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let outcome = state
        .orchestrator
        .identify_upload(file, query.level)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// POST /identify/cancel
pub async fn cancel_identify(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.orchestrator.cancel_identify(),
    })
}

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub identifying: bool,
    pub result: Option<IdentifyOutcome>,
}

/// GET /result
pub async fn last_result(State(state): State<AppState>) -> Json<ResultResponse> {
    Json(ResultResponse {
        identifying: state.orchestrator.is_identifying(),
        result: state.orchestrator.last_result().await,
    })
}

/// DELETE /result
pub async fn reset_result(State(state): State<AppState>) -> StatusCode {
    state.orchestrator.reset().await;
    StatusCode::NO_CONTENT
}

pub fn identify_routes() -> Router<AppState> {
    Router::new()
        .route("/identify", post(identify_upload))
        .route("/identify/cancel", post(cancel_identify))
        .route("/result", get(last_result).delete(reset_result))
}
