//! History endpoints
//!
//! `GET /history` returns the reconciled live view of the signed-in owner.
//! `GET /history/events` streams it over SSE, one `history` event per
//! change, carrying list-row summaries.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ApiResult, IdentifyError};
use crate::ledger::HistorySnapshot;
use crate::models::{HistoryEntrySummary, Identity};
use crate::AppState;

/// GET /history
pub async fn get_history(State(state): State<AppState>) -> ApiResult<Json<HistorySnapshot>> {
    if state.orchestrator.current_identity().await.is_none() {
        return Err(IdentifyError::SignedOut.into());
    }
    Ok(Json(state.orchestrator.ledger().snapshot()))
}

#[derive(Debug, Serialize)]
struct HistoryEventPayload {
    owner: Option<Identity>,
    loaded: bool,
    entries: Vec<HistoryEntrySummary>,
}

impl From<&HistorySnapshot> for HistoryEventPayload {
    fn from(snapshot: &HistorySnapshot) -> Self {
        Self {
            owner: snapshot.owner.clone(),
            loaded: snapshot.loaded,
            entries: snapshot.summaries(),
        }
    }
}

fn history_event(snapshot: &HistorySnapshot) -> Option<Event> {
    match serde_json::to_string(&HistoryEventPayload::from(snapshot)) {
        Ok(json) => Some(Event::default().event("history").data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize history snapshot: {}", e);
            None
        }
    }
}

/// GET /history/events
pub async fn history_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to history events");

    let mut rx = state.orchestrator.history();

    let stream = async_stream::stream! {
        let initial = rx.borrow_and_update().clone();
        if let Some(event) = history_event(&initial) {
            yield Ok(event);
        }

        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            debug!(records = snapshot.records.len(), "SSE: Broadcasting history change");
            if let Some(event) = history_event(&snapshot) {
                yield Ok(event);
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/history", get(get_history))
        .route("/history/events", get(history_event_stream))
}
