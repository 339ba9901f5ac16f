//! Axum router construction for the operator API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkin_core::{Clock, EventStateStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the operator router.
///
/// - `GET /health` -- liveness
/// - `GET /api/event-state/status` -- scheduler status
/// - `GET /api/event-state/health` -- store probe and drift count
/// - `POST /api/event-state/start` -- start the scheduler
/// - `POST /api/event-state/stop` -- stop the scheduler
/// - `POST /api/event-state/sync` -- run a sync pass now
/// - `GET /api/events/{id}/state` -- stored vs calculated state
/// - `PUT /api/events/{id}/state` -- set state manually
///
/// CORS allows any origin.
pub fn build_router<S, C>(state: Arc<AppState<S, C>>) -> Router
where
    S: EventStateStore + 'static,
    C: Clock + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // Scheduler control
        .route(
            "/api/event-state/status",
            get(handlers::scheduler_status::<S, C>),
        )
        .route("/api/event-state/health", get(handlers::store_health::<S, C>))
        .route("/api/event-state/start", post(handlers::start_scheduler::<S, C>))
        .route("/api/event-state/stop", post(handlers::stop_scheduler::<S, C>))
        .route("/api/event-state/sync", post(handlers::trigger_sync::<S, C>))
        // Per-event state
        .route(
            "/api/events/{id}/state",
            get(handlers::get_event_state::<S, C>).put(handlers::put_event_state::<S, C>),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
