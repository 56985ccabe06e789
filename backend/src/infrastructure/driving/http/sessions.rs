use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use shared::SessionSummary;

use crate::domain::aggregates::PeerSession;
use crate::domain::errors::BridgeError;
use crate::domain::value_objects::SessionId;
use crate::infrastructure::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    let mut summaries = Vec::new();
    for handle in state.lifecycle.registry().list().await {
        summaries.push(summary(&handle.snapshot().await));
    }
    summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Json(summaries)
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, BridgeError> {
    let id = SessionId::from_string(id);
    if state.lifecycle.close(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(BridgeError::SessionNotFound(id))
    }
}

fn summary(session: &PeerSession) -> SessionSummary {
    SessionSummary {
        id: session.id.to_string(),
        state: session.state.to_string(),
        has_remote_offer: session.negotiation.has_remote_offer,
        has_local_answer: session.negotiation.has_local_answer,
        track_id: session.track_id.clone(),
        created_at: session.created_at.to_rfc3339(),
    }
}
