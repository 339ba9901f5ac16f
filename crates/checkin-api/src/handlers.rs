//! Request handlers for the operator API.
//!
//! Handlers are generic over the store and clock so the same code serves
//! `PostgreSQL` in production and the in-memory store in tests.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use checkin_core::{Clock, EventStateStore, StartOutcome};
use checkin_types::{EventId, EventState};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `PUT /api/events/{id}/state`.
#[derive(Debug, Deserialize)]
pub struct StateChangeRequest {
    /// Target state, `"OPEN"` or `"CLOSED"`.
    pub state: String,
}

/// `GET /health` -- liveness.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /api/event-state/status`
pub async fn scheduler_status<S, C>(State(state): State<Arc<AppState<S, C>>>) -> impl IntoResponse
where
    S: EventStateStore + 'static,
    C: Clock + 'static,
{
    Json(state.scheduler().status().await)
}

/// `GET /api/event-state/health` -- store probe and current drift.
///
/// Responds 503 when the store is unreachable.
pub async fn store_health<S, C>(State(state): State<Arc<AppState<S, C>>>) -> impl IntoResponse
where
    S: EventStateStore + 'static,
    C: Clock + 'static,
{
    let report = state.reconciler().health_check().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

/// `POST /api/event-state/start`
pub async fn start_scheduler<S, C>(State(state): State<Arc<AppState<S, C>>>) -> impl IntoResponse
where
    S: EventStateStore + 'static,
    C: Clock + 'static,
{
    let outcome = state.scheduler().start().await;
    let status = match outcome {
        StartOutcome::Error { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        StartOutcome::Started { .. } | StartOutcome::AlreadyRunning => StatusCode::OK,
    };
    (status, Json(outcome))
}

/// `POST /api/event-state/stop`
pub async fn stop_scheduler<S, C>(State(state): State<Arc<AppState<S, C>>>) -> impl IntoResponse
where
    S: EventStateStore + 'static,
    C: Clock + 'static,
{
    Json(state.scheduler().stop().await)
}

/// `POST /api/event-state/sync` -- run a sync pass immediately.
pub async fn trigger_sync<S, C>(State(state): State<Arc<AppState<S, C>>>) -> impl IntoResponse
where
    S: EventStateStore + 'static,
    C: Clock + 'static,
{
    Json(state.scheduler().trigger_now().await)
}

/// `GET /api/events/{id}/state`
pub async fn get_event_state<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    S: EventStateStore + 'static,
    C: Clock + 'static,
{
    let id = parse_event_id(&id)?;
    let details = state.reconciler().state_details(id).await?;
    Ok(Json(details))
}

/// `PUT /api/events/{id}/state` -- manual override.
///
/// The override stands only until the next sync pass disagrees with it.
pub async fn put_event_state<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<String>,
    Json(body): Json<StateChangeRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    S: EventStateStore + 'static,
    C: Clock + 'static,
{
    let id = parse_event_id(&id)?;
    let new_state: EventState = body.state.parse().map_err(|_| {
        ApiError::InvalidArgument(format!(
            "invalid state: {}. Must be OPEN or CLOSED.",
            body.state
        ))
    })?;

    let event = state.reconciler().update_one(id, new_state).await?;
    info!(event_id = %id, state = %event.state, "Event state set by operator");
    Ok(Json(event))
}

fn parse_event_id(raw: &str) -> Result<EventId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::InvalidUuid(format!("Invalid event id: {raw}")))
}
