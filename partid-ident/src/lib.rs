//! partid-ident library interface
//!
//! Capture → identification → ledger pipeline for electronic components,
//! plus the HTTP adapter the binary serves.

pub mod api;
pub mod capture;
pub mod error;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod recognition;

pub use crate::error::{ApiError, ApiResult, IdentifyError};
pub use crate::orchestrator::Orchestrator;
pub use crate::pipeline::IdentifyOutcome;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::capture::CaptureSession;

/// Largest accepted upload body
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// The capture session currently driven over HTTP, if any
    pub capture: Arc<Mutex<Option<CaptureSession>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            capture: Arc::new(Mutex::new(None)),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::session_routes())
        .merge(api::capture_routes())
        .merge(api::identify_routes())
        .merge(api::history_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
