//! REST endpoints for bot status and recent intake records.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::DatabaseError;
use crate::forms::SessionStore;
use crate::store::RecordRepository;

/// Default and maximum page size for `/api/persons`.
const DEFAULT_PERSONS_LIMIT: usize = 20;
const MAX_PERSONS_LIMIT: usize = 100;

/// Shared state for status routes.
#[derive(Clone)]
pub struct StatusRouteState {
    pub repo: Arc<dyn RecordRepository>,
    pub sessions: Arc<SessionStore>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub active_sessions: usize,
    pub staff: u64,
    pub persons: u64,
}

#[derive(Debug, Deserialize)]
struct PersonsQuery {
    limit: Option<usize>,
}

fn storage_error(e: DatabaseError) -> Response {
    error!(error = %e, "Status query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "storage unavailable"})),
    )
        .into_response()
}

/// GET /api/status
async fn get_status(State(state): State<StatusRouteState>) -> Response {
    let counts = async {
        Ok::<_, DatabaseError>((
            state.repo.count_staff().await?,
            state.repo.count_persons().await?,
        ))
    };
    match counts.await {
        Ok((staff, persons)) => Json(StatusSnapshot {
            active_sessions: state.sessions.len().await,
            staff,
            persons,
        })
        .into_response(),
        Err(e) => storage_error(e),
    }
}

/// GET /api/persons?limit=N
///
/// Most recent persons first. `limit` defaults to 20 and is capped at 100.
async fn list_persons(
    State(state): State<StatusRouteState>,
    Query(query): Query<PersonsQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PERSONS_LIMIT)
        .min(MAX_PERSONS_LIMIT);
    match state.repo.list_persons(limit).await {
        Ok(persons) => Json(persons).into_response(),
        Err(e) => storage_error(e),
    }
}

/// Build the status REST routes.
pub fn status_routes(state: StatusRouteState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/persons", get(list_persons))
        .with_state(state)
}
