use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use events_core::{Event, EventFilter, EventStore, SortKey, StoreError};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(create_event).get(list_events))
        .route("/events/", post(create_event).get(list_events))
        .route(
            "/events/{event_id}",
            get(get_event).put(update_event).delete(delete_event),
        )
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
    sort: Option<String>,
}

/// Run a store call on the blocking pool, bounded by the store timeout.
///
/// A call that has not started by the deadline is skipped. One that is
/// already running cannot be interrupted and may still commit after the
/// caller has been answered with 504.
async fn run_store<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn EventStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = state.store.clone();
    let deadline = Instant::now() + state.store_timeout;
    let task = tokio::task::spawn_blocking(move || {
        if Instant::now() >= deadline {
            return None;
        }
        Some(op(store.as_ref()))
    });

    match tokio::time::timeout(state.store_timeout, task).await {
        Ok(Ok(Some(result))) => result.map_err(ApiError::from),
        Ok(Ok(None)) | Err(_) => Err(ApiError::Timeout),
        Ok(Err(e)) => Err(ApiError::Internal(format!("store task failed: {}", e))),
    }
}

fn parse_body(body: Result<Bytes, BytesRejection>) -> Result<Value, ApiError> {
    let body = body?;
    serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))
}

fn require_id(event_id: Result<Path<String>, PathRejection>) -> Result<String, ApiError> {
    let Path(event_id) = event_id?;
    if event_id.trim().is_empty() {
        return Err(ApiError::BadRequest("Event ID is required".to_string()));
    }
    Ok(event_id)
}

/// POST /events - Create a new event.
async fn create_event(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let payload = parse_body(body)?;
    let new_event = state.validator.validate_create(&payload)?;

    let event = run_store(&state, move |store| store.create(new_event)).await?;
    tracing::info!(event_id = %event.event_id, "event created");

    let location = format!("/events/{}", event.event_id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(event)).into_response())
}

/// GET /events?status=...&sort=... - List events.
async fn list_events(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let Query(query) = query?;
    let sort = query
        .sort
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<SortKey>())
        .transpose()?;
    let filter = EventFilter {
        status: query.status.filter(|s| !s.is_empty()),
        sort,
    };

    let events = run_store(&state, move |store| store.list(&filter)).await?;
    Ok(Json(events))
}

/// GET /events/{event_id} - Get a single event.
async fn get_event(
    State(state): State<AppState>,
    event_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Event>, ApiError> {
    let event_id = require_id(event_id)?;
    let event = run_store(&state, move |store| store.get(&event_id)).await?;
    Ok(Json(event))
}

/// PUT /events/{event_id} - Update the supplied fields of an event.
async fn update_event(
    State(state): State<AppState>,
    event_id: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Event>, ApiError> {
    let event_id = require_id(event_id)?;
    let payload = parse_body(body)?;
    let patch = state.validator.validate_update(&payload)?;

    let event = run_store(&state, move |store| store.update(&event_id, patch)).await?;
    tracing::info!(event_id = %event.event_id, "event updated");
    Ok(Json(event))
}

/// DELETE /events/{event_id} - Delete an event.
async fn delete_event(
    State(state): State<AppState>,
    event_id: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let event_id = require_id(event_id)?;
    let deleted_id = event_id.clone();

    run_store(&state, move |store| store.delete(&event_id)).await?;
    tracing::info!(event_id = %deleted_id, "event deleted");
    Ok(StatusCode::NO_CONTENT)
}
