use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use events_core::{
    Event, EventFilter, EventPatch, EventStore, InMemoryEventStore, NewEvent, StoreError,
    Validator,
};
use events_db::{init_database, RedbEventStore};
use events_server::{build_app, routes::create_router, AppState, Config};

/// Create a test app backed by the in-memory store.
fn create_test_app() -> Router {
    create_router(AppState::new(Arc::new(InMemoryEventStore::new())))
}

/// Delays its first create past any short store timeout, then behaves like
/// the in-memory store.
struct SlowFirstCreateStore {
    inner: InMemoryEventStore,
    delay: Duration,
    delayed: AtomicBool,
}

impl SlowFirstCreateStore {
    fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            delay,
            delayed: AtomicBool::new(false),
        }
    }
}

impl EventStore for SlowFirstCreateStore {
    fn create(&self, new_event: NewEvent) -> Result<Event, StoreError> {
        if !self.delayed.swap(true, Ordering::SeqCst) {
            std::thread::sleep(self.delay);
        }
        self.inner.create(new_event)
    }

    fn get(&self, event_id: &str) -> Result<Event, StoreError> {
        self.inner.get(event_id)
    }

    fn list(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        self.inner.list(filter)
    }

    fn update(&self, event_id: &str, patch: EventPatch) -> Result<Event, StoreError> {
        self.inner.update(event_id, patch)
    }

    fn delete(&self, event_id: &str) -> Result<(), StoreError> {
        self.inner.delete(event_id)
    }
}

/// A store whose backend is always down.
struct BrokenStore;

fn disk_failure() -> StoreError {
    StoreError::Database("disk I/O error on events.redb".to_string())
}

impl EventStore for BrokenStore {
    fn create(&self, _: NewEvent) -> Result<Event, StoreError> {
        Err(disk_failure())
    }

    fn get(&self, _: &str) -> Result<Event, StoreError> {
        Err(disk_failure())
    }

    fn list(&self, _: &EventFilter) -> Result<Vec<Event>, StoreError> {
        Err(disk_failure())
    }

    fn update(&self, _: &str, _: EventPatch) -> Result<Event, StoreError> {
        Err(disk_failure())
    }

    fn delete(&self, _: &str) -> Result<(), StoreError> {
        Err(disk_failure())
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let (status, _, body) = send_raw(app, method, uri, body).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body).unwrap()
    };
    (status, json)
}

async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<&str>,
) -> (StatusCode, axum::http::HeaderMap, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("Content-Type", "application/json");
    }
    let request = builder
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn create(app: &Router, body: Value) -> Value {
    let (status, json) = send(app, "POST", "/events", Some(&body.to_string())).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", json);
    json
}

// ============================================================================
// Health endpoint tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"status": "healthy"}));
}

#[tokio::test]
async fn test_index_endpoint() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Events API");
    assert!(json["version"].is_string());
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_event_lifecycle() {
    let app = create_test_app();

    // Create
    let (status, headers, body) = send_raw(
        &app,
        "POST",
        "/events",
        Some(r#"{"title":"Conf","date":"2025-12-01","capacity":100}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: Value = serde_json::from_str(&body).unwrap();
    let id = created["eventId"].as_str().unwrap().to_string();
    assert!(!id.is_empty());
    assert_eq!(created["status"], "active");
    assert_eq!(created["title"], "Conf");
    assert_eq!(created["capacity"], 100);
    assert!(created["description"].is_null());
    assert_eq!(
        headers.get(header::LOCATION).unwrap(),
        format!("/events/{}", id).as_str()
    );

    // Get
    let (status, fetched) = send(&app, "GET", &format!("/events/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    // Update status only
    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/events/{}", id),
        Some(r#"{"status":"cancelled"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "cancelled");
    assert_eq!(updated["title"], "Conf");
    assert_eq!(updated["capacity"], 100);
    assert_eq!(updated["eventId"], id.as_str());

    // Delete
    let (status, _, body) = send_raw(&app, "DELETE", &format!("/events/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    // Gone
    let (status, json) = send(&app, "GET", &format!("/events/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["detail"], format!("Event with ID {} not found", id));
    assert_eq!(json["error_code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_create_assigns_unique_ids() {
    let app = create_test_app();
    let body = json!({"title": "Conf", "date": "2025-12-01"});

    let a = create(&app, body.clone()).await;
    let b = create(&app, body).await;

    assert_ne!(a["eventId"], b["eventId"]);
}

#[tokio::test]
async fn test_create_with_trailing_slash() {
    let app = create_test_app();

    let (status, _) = send(
        &app,
        "POST",
        "/events/",
        Some(r#"{"title":"Conf","date":"2025-12-01"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = send(&app, "GET", "/events/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_normalizes_status() {
    let app = create_test_app();

    let created = create(
        &app,
        json!({"title": "Conf", "date": "2025-12-01", "status": "POSTPONED"}),
    )
    .await;

    assert_eq!(created["status"], "postponed");
}

#[tokio::test]
async fn test_create_with_client_id_and_conflict() {
    let app = create_test_app();
    let body = json!({"eventId": "launch-2025", "title": "Launch", "date": "2025-06-01"});

    let created = create(&app, body.clone()).await;
    assert_eq!(created["eventId"], "launch-2025");

    let (status, json) = send(&app, "POST", "/events", Some(&body.to_string())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error_code"], "CONFLICT");

    // Ids are not reused after deletion
    let (status, _) = send(&app, "DELETE", "/events/launch-2025", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "POST", "/events", Some(&body.to_string())).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_create_rejects_non_positive_capacity() {
    let app = create_test_app();

    for capacity in [0, -5] {
        let body = json!({"title": "Conf", "date": "2025-12-01", "capacity": capacity});
        let (status, json) = send(&app, "POST", "/events", Some(&body.to_string())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "Validation error");
        assert_eq!(json["error_code"], "VALIDATION_ERROR");
        assert_eq!(json["errors"][0]["field"], "capacity");
        assert_eq!(json["errors"][0]["type"], "value_error.number.not_gt");
    }

    let (_, list) = send(&app, "GET", "/events", None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_type_mismatch_is_unprocessable() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        "POST",
        "/events",
        Some(r#"{"title":"Conf","date":"2025-12-01","capacity":"lots"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["errors"][0]["type"], "type_error.integer");
}

#[tokio::test]
async fn test_create_reports_all_errors() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        "POST",
        "/events",
        Some(r#"{"date":"12/01/2025","capacity":0,"status":"archived"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = json["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["title", "date", "capacity", "status"]);
    assert_eq!(json["errors"][0]["type"], "value_error.missing");
}

#[tokio::test]
async fn test_create_malformed_body() {
    let app = create_test_app();

    let (status, json) = send(&app, "POST", "/events", Some("{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["detail"]
        .as_str()
        .unwrap()
        .starts_with("Invalid request body"));
    assert_eq!(json["error_code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_strict_mode_rejects_unknown_fields() {
    let store = Arc::new(InMemoryEventStore::new());
    let app = create_router(AppState::new(store).with_validator(Validator::with_strict(true)));

    let (status, json) = send(
        &app,
        "POST",
        "/events",
        Some(r#"{"title":"Conf","date":"2025-12-01","venue":"Hall A"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["errors"][0]["field"], "venue");
    assert_eq!(json["errors"][0]["type"], "value_error.extra");
}

#[tokio::test]
async fn test_unknown_fields_ignored_by_default() {
    let app = create_test_app();

    let created = create(
        &app,
        json!({"title": "Conf", "date": "2025-12-01", "venue": "Hall A"}),
    )
    .await;

    assert!(created.get("venue").is_none());
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_update_is_partial() {
    let app = create_test_app();
    let created = create(
        &app,
        json!({
            "title": "Conf",
            "description": "Annual conference",
            "date": "2025-12-01",
            "location": "Oslo",
            "capacity": 100,
            "organizer": "Team"
        }),
    )
    .await;
    let uri = format!("/events/{}", created["eventId"].as_str().unwrap());

    let (status, updated) = send(&app, "PUT", &uri, Some(r#"{"status":"completed"}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let mut expected = created.clone();
    expected["status"] = json!("completed");
    assert_eq!(updated, expected);
}

#[tokio::test]
async fn test_update_is_idempotent() {
    let app = create_test_app();
    let created = create(&app, json!({"title": "Conf", "date": "2025-12-01"})).await;
    let uri = format!("/events/{}", created["eventId"].as_str().unwrap());
    let body = r#"{"title":"Renamed","capacity":20}"#;

    let (_, first) = send(&app, "PUT", &uri, Some(body)).await;
    let (_, second) = send(&app, "PUT", &uri, Some(body)).await;

    assert_eq!(first, second);
    assert_eq!(second["title"], "Renamed");
    assert_eq!(second["capacity"], 20);
}

#[tokio::test]
async fn test_update_invalid_leaves_event_unchanged() {
    let app = create_test_app();
    let created = create(
        &app,
        json!({"title": "Conf", "date": "2025-12-01", "capacity": 100}),
    )
    .await;
    let uri = format!("/events/{}", created["eventId"].as_str().unwrap());

    let (status, _) = send(
        &app,
        "PUT",
        &uri,
        Some(r#"{"title":"Renamed","capacity":-1}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, fetched) = send(&app, "GET", &uri, None).await;
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_update_requires_a_field() {
    let app = create_test_app();
    let created = create(&app, json!({"title": "Conf", "date": "2025-12-01"})).await;
    let uri = format!("/events/{}", created["eventId"].as_str().unwrap());

    let (status, json) = send(&app, "PUT", &uri, Some("{}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["detail"],
        "At least one field must be provided for update"
    );
}

#[tokio::test]
async fn test_update_missing_event() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        "PUT",
        "/events/does-not-exist",
        Some(r#"{"status":"completed"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["detail"], "Event with ID does-not-exist not found");
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_twice_is_not_found() {
    let app = create_test_app();
    let created = create(&app, json!({"title": "Conf", "date": "2025-12-01"})).await;
    let uri = format!("/events/{}", created["eventId"].as_str().unwrap());

    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "NOT_FOUND");

    let (status, _) = send(&app, "PUT", &uri, Some(r#"{"title":"Back"}"#)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blank_id_is_bad_request() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/events/%20", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "Event ID is required");
}

// ============================================================================
// List
// ============================================================================

#[tokio::test]
async fn test_list_empty() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/events", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let app = create_test_app();
    create(&app, json!({"title": "A", "date": "2025-01-01"})).await;
    create(&app, json!({"title": "B", "date": "2025-02-01", "status": "cancelled"})).await;
    create(&app, json!({"title": "C", "date": "2025-03-01", "status": "Active"})).await;

    let (status, json) = send(&app, "GET", "/events?status=ACTIVE&sort=title", None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["A", "C"]);

    let (status, json) = send(&app, "GET", "/events?status=postponed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));

    let (_, json) = send(&app, "GET", "/events", None).await;
    assert_eq!(json.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_list_sorted_descending() {
    let app = create_test_app();
    create(&app, json!({"title": "A", "date": "2025-01-01"})).await;
    create(&app, json!({"title": "B", "date": "2025-03-01"})).await;
    create(&app, json!({"title": "C", "date": "2025-02-01"})).await;

    let (status, json) = send(&app, "GET", "/events?sort=-date", None).await;

    assert_eq!(status, StatusCode::OK);
    let dates: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["date"].as_str().unwrap())
        .collect();
    assert_eq!(dates, vec!["2025-03-01", "2025-02-01", "2025-01-01"]);
}

#[tokio::test]
async fn test_list_rejects_unknown_sort() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/events?sort=venue", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["errors"][0]["field"], "sort");
}

// ============================================================================
// Ambient behaviour
// ============================================================================

#[tokio::test]
async fn test_request_id_is_echoed_or_generated() {
    let app = create_test_app();

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-123");

    let (_, headers, _) = send_raw(&app, "GET", "/health", None).await;
    assert!(!headers.get("x-request-id").unwrap().is_empty());
}

#[tokio::test]
async fn test_cors_preflight() {
    let config = Config::for_testing();
    let state = AppState::from_config(&config).unwrap();
    let app = build_app(state, &config);

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/events")
        .header("Origin", "https://app.example")
        .header("Access-Control-Request-Method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_redb_backed_app() {
    let dir = tempfile::tempdir().unwrap();
    let db = init_database(dir.path().join("events.redb")).unwrap();
    let app = create_router(AppState::new(Arc::new(RedbEventStore::new(db))));

    let created = create(
        &app,
        json!({"title": "Conf", "date": "2025-12-01", "capacity": 100}),
    )
    .await;
    let uri = format!("/events/{}", created["eventId"].as_str().unwrap());

    let (status, fetched) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, updated) = send(&app, "PUT", &uri, Some(r#"{"status":"completed"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Conf");
    assert_eq!(updated["status"], "completed");

    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Error envelope coverage
// ============================================================================

#[tokio::test]
async fn test_bad_query_string_uses_envelope() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/events?status=active&status=cancelled", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "BAD_REQUEST");
    assert!(json["detail"].as_str().unwrap().contains("status"));
}

#[tokio::test]
async fn test_bad_path_segment_uses_envelope() {
    let app = create_test_app();

    for method in ["GET", "DELETE"] {
        let (status, json) = send(&app, method, "/events/%FF", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error_code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn test_unknown_route_uses_envelope() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/venues", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["detail"], "Not Found");
    assert_eq!(json["error_code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unsupported_method_uses_envelope() {
    let app = create_test_app();

    let (status, json) = send(&app, "PATCH", "/events/abc", Some(r#"{"title":"x"}"#)).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json["error_code"], "METHOD_NOT_ALLOWED");
}

#[tokio::test]
async fn test_create_with_iso_timestamps() {
    let app = create_test_app();

    for date in [
        "2025-12-01T10:00:00Z",
        "2025-12-01T10:00:00+02:00",
        "2025-12-01T10:00",
        "2025-12-01 10:00:00",
    ] {
        let created = create(&app, json!({"title": "Conf", "date": date})).await;
        assert_eq!(created["date"], date);
    }
}

#[tokio::test]
async fn test_create_accepts_whole_float_capacity() {
    let app = create_test_app();

    let created = create(
        &app,
        json!({"title": "Conf", "date": "2025-12-01", "capacity": 100.0}),
    )
    .await;

    assert_eq!(created["capacity"], 100);
}

// ============================================================================
// Store failures
// ============================================================================

#[tokio::test]
async fn test_store_failure_is_internal_error() {
    let app = create_router(AppState::new(Arc::new(BrokenStore)));

    let (status, json) = send(&app, "GET", "/events", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["detail"], "Internal server error");
    assert_eq!(json["error_code"], "INTERNAL_ERROR");
    assert!(!json.to_string().contains("disk"));

    let (status, json) = send(
        &app,
        "POST",
        "/events",
        Some(r#"{"title":"Conf","date":"2025-12-01"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error_code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn test_slow_store_times_out_and_retry_with_same_id_conflicts() {
    let store = Arc::new(SlowFirstCreateStore::new(Duration::from_millis(200)));
    let app = create_router(
        AppState::new(store).with_store_timeout(Duration::from_millis(20)),
    );
    let body = r#"{"eventId":"gala-2025","title":"Gala","date":"2025-12-01"}"#;

    let (status, json) = send(&app, "POST", "/events", Some(body)).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["detail"], "Request timed out");
    assert_eq!(json["error_code"], "TIMEOUT");

    // The running store call is not cancelled; it commits once it finishes.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let (status, fetched) = send(&app, "GET", "/events/gala-2025", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Gala");

    let (status, json) = send(&app, "POST", "/events", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error_code"], "CONFLICT");
}
