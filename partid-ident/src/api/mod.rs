//! HTTP API handlers
//!
//! Thin adapter over the orchestrator: session signals, capture session
//! control, identification, history and health.

pub mod capture;
pub mod health;
pub mod history;
pub mod identify;
pub mod session;

pub use capture::capture_routes;
pub use health::health_routes;
pub use history::{history_event_stream, history_routes};
pub use identify::identify_routes;
pub use session::session_routes;

use serde::Deserialize;

use crate::models::AnalysisLevel;

/// `?level=basic|advanced`, default basic
#[derive(Debug, Default, Deserialize)]
pub struct LevelQuery {
    #[serde(default)]
    pub level: AnalysisLevel,
}
