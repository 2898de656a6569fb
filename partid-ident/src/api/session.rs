//! Identity provider signals
//!
//! POST /session carries signed-in, DELETE /session carries signed-out.

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::{Identity, SessionSignal};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub identity: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub owner: Option<Identity>,
}

/// POST /session
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let identity = Identity::new(request.identity)
        .ok_or_else(|| ApiError::BadRequest("identity must not be blank".to_string()))?;

    // A preview taken by another owner must not be confirmed under this one
    if state.orchestrator.current_identity().await.as_ref() != Some(&identity) {
        if let Some(mut session) = state.capture.lock().await.take() {
            session.cancel();
        }
    }

    state
        .orchestrator
        .handle_session_signal(SessionSignal::SignedIn(identity))
        .await?;

    Ok(Json(SessionResponse {
        owner: state.orchestrator.current_identity().await,
    }))
}

/// DELETE /session
pub async fn sign_out(State(state): State<AppState>) -> StatusCode {
    if let Some(mut session) = state.capture.lock().await.take() {
        session.cancel();
    }
    state.orchestrator.sign_out().await;
    StatusCode::NO_CONTENT
}

/// GET /session
pub async fn current_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(SessionResponse {
        owner: state.orchestrator.current_identity().await,
    })
}

pub fn session_routes() -> Router<AppState> {
    Router::new().route(
        "/session",
        post(sign_in).delete(sign_out).get(current_session),
    )
}
