//! API route handlers for the gateway.
//!
//! Validation lives here: required-field checks answer 400 before anything
//! touches the cores. Storage failures map to 500, delivery failures to
//! 502.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use rally_core::{Payload, RallyError};
use rally_push::{DispatchReport, NotifyOutcome};
use rally_reminders::schedule::{self, SeedOutcome, SeedRequest};
use rally_store::NotificationRecord;
use serde::Deserialize;

use super::server::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);
type ApiResult<T> = Result<T, ApiError>;

fn bad_request(msg: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": msg })),
    )
}

fn internal(err: RallyError) -> ApiError {
    let status = match &err {
        RallyError::Validation(_) => StatusCode::BAD_REQUEST,
        RallyError::Delivery(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(error = %err, "request failed");
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "rally-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

#[derive(Deserialize)]
pub struct TokenBody {
    uid: Option<String>,
    token: Option<String>,
}

/// POST /api/v1/tokens — register or update a device token.
pub async fn register_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenBody>,
) -> ApiResult<StatusCode> {
    let (Some(uid), Some(token)) = (required(body.uid), required(body.token)) else {
        return Err(bad_request("uid and token are required"));
    };
    state
        .store
        .upsert_device_token(&uid, &token)
        .map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct RecordBody {
    uid: Option<String>,
    title: Option<String>,
    body: Option<String>,
    #[serde(default)]
    data: Payload,
}

/// POST /api/v1/notifications — persist a record without pushing.
pub async fn record_notification(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RecordBody>,
) -> ApiResult<(StatusCode, Json<NotificationRecord>)> {
    let (Some(uid), Some(title), Some(text)) = (
        required(body.uid),
        required(body.title),
        required(body.body),
    ) else {
        return Err(bad_request("uid, title and body are required"));
    };
    let record = NotificationRecord::new(&uid, &title, &text, &body.data);
    state
        .store
        .insert_notification(&record)
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(record)))
}

fn default_save() -> bool {
    true
}

#[derive(Deserialize)]
pub struct SendBody {
    uids: Option<Vec<String>>,
    title: Option<String>,
    body: Option<String>,
    #[serde(default)]
    data: Payload,
    #[serde(default = "default_save")]
    save: bool,
}

/// POST /api/v1/notifications/send — ad-hoc multicast to a uid list.
pub async fn send_notifications(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SendBody>,
) -> ApiResult<Json<DispatchReport>> {
    let Some(uids) = body.uids.filter(|u| !u.is_empty()) else {
        return Err(bad_request("uids is required and must be a non-empty array"));
    };
    let (Some(title), Some(text)) = (required(body.title), required(body.body)) else {
        return Err(bad_request("title and body are required"));
    };
    let report = state
        .dispatcher
        .send_to_uids(&uids, &title, &text, &body.data, body.save)
        .await
        .map_err(internal)?;
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
    before: Option<String>,
}

/// GET /api/v1/notifications/{uid} — newest first, cursor-paged.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<NotificationRecord>>> {
    let limit = query.limit.unwrap_or(20).min(100);
    let list = state
        .store
        .notifications_for(&uid, limit, query.before.as_deref())
        .map_err(internal)?;
    Ok(Json(list))
}

#[derive(Deserialize)]
pub struct SeedBody {
    uid: Option<String>,
    event_id: Option<String>,
    event_title: Option<String>,
    event_date: Option<String>,
    interval_days: Option<i64>,
    test_every_minutes: Option<i64>,
}

/// Accept RFC 3339 or a plain `YYYY-MM-DDTHH:MM:SS`; offset-less
/// timestamps are interpreted in server-local time.
fn parse_event_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// POST /api/v1/reminders/seed — create the pending reminder ladder.
pub async fn seed_reminders(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SeedBody>,
) -> ApiResult<Json<SeedOutcome>> {
    let (Some(uid), Some(event_id), Some(event_title), Some(event_date)) = (
        required(body.uid),
        required(body.event_id),
        required(body.event_title),
        required(body.event_date),
    ) else {
        return Err(bad_request(
            "uid, event_id, event_title and event_date are required",
        ));
    };
    let Some(event_date) = parse_event_date(&event_date) else {
        return Err(bad_request("event_date must be an RFC 3339 timestamp"));
    };

    let request = SeedRequest {
        uid,
        event_id,
        event_title,
        event_date,
        interval_days: body.interval_days,
        test_every_minutes: body.test_every_minutes,
    };
    let outcome = schedule::seed_event_reminders(&state.store, &request).map_err(internal)?;
    Ok(Json(outcome))
}

fn notify_outcome_json(outcome: NotifyOutcome) -> serde_json::Value {
    match outcome {
        NotifyOutcome::Sent(report) => serde_json::to_value(&report).unwrap_or_default(),
        NotifyOutcome::Skipped(reason) => {
            serde_json::json!({ "sent": null, "reason": reason.as_str() })
        }
    }
}

#[derive(Deserialize)]
pub struct RegistrationBody {
    actor_uid: Option<String>,
    actor_name: Option<String>,
    event_title: Option<String>,
}

/// POST /api/v1/events/{event_id}/notify-registration — tell the organizer
/// someone signed up.
pub async fn notify_registration(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    Json(body): Json<RegistrationBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let (Some(actor_uid), Some(actor_name), Some(event_title)) = (
        required(body.actor_uid),
        required(body.actor_name),
        required(body.event_title),
    ) else {
        return Err(bad_request(
            "actor_uid, actor_name and event_title are required",
        ));
    };
    let outcome = state
        .dispatcher
        .notify_organizer_registration(&event_id, &actor_uid, &actor_name, &event_title)
        .await
        .map_err(internal)?;
    Ok(Json(notify_outcome_json(outcome)))
}

#[derive(Deserialize)]
pub struct ChangeBody {
    event_title: Option<String>,
    message: Option<String>,
    new_date: Option<String>,
}

/// POST /api/v1/events/{event_id}/notify-change — fan out to attendees.
pub async fn notify_change(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    Json(body): Json<ChangeBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let Some(event_title) = required(body.event_title) else {
        return Err(bad_request("event_title is required"));
    };
    let outcome = state
        .dispatcher
        .notify_event_change(
            &event_id,
            &event_title,
            body.message.as_deref(),
            body.new_date.as_deref(),
        )
        .await
        .map_err(internal)?;
    Ok(Json(notify_outcome_json(outcome)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rally_push::{Dispatcher, MulticastOutcome, PushGateway, PushMessage};
    use rally_store::DocStore;
    use tower::util::ServiceExt;

    use crate::server::{AppState, build_router};

    struct FakeGateway;

    #[async_trait]
    impl PushGateway for FakeGateway {
        async fn send_multicast(
            &self,
            message: &PushMessage,
        ) -> rally_core::Result<MulticastOutcome> {
            Ok(MulticastOutcome {
                success_count: message.tokens.len() as u32,
                failure_count: 0,
                responses: Vec::new(),
            })
        }
    }

    fn app() -> (Arc<DocStore>, Router) {
        let store = Arc::new(DocStore::open_in_memory().unwrap());
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), Arc::new(FakeGateway)));
        let router = build_router(AppState::new(store.clone(), dispatcher));
        (store, router)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let (_, router) = app();
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn token_registration_validates_and_persists() {
        let (store, router) = app();

        let response = router
            .clone()
            .oneshot(post_json("/api/v1/tokens", r#"{"uid": "u1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router
            .oneshot(post_json(
                "/api/v1/tokens",
                r#"{"uid": "u1", "token": "tok-1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            store.device_tokens_for(&["u1".into()]).unwrap(),
            vec!["tok-1"]
        );
    }

    #[tokio::test]
    async fn record_then_list_roundtrips() {
        let (_, router) = app();

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/v1/notifications",
                r#"{"uid": "u1", "title": "Hi", "body": "There", "data": {"k": 1}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["read"], false);

        let response = router
            .oneshot(
                Request::get("/api/v1/notifications/u1?limit=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let list = json_body(response).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["title"], "Hi");
    }

    #[tokio::test]
    async fn send_requires_a_non_empty_uid_list() {
        let (_, router) = app();
        let response = router
            .oneshot(post_json(
                "/api/v1/notifications/send",
                r#"{"uids": [], "title": "Hi", "body": "There"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn send_reports_saved_and_sent() {
        let (store, router) = app();
        store.upsert_device_token("u1", "tok-1").unwrap();

        let response = router
            .oneshot(post_json(
                "/api/v1/notifications/send",
                r#"{"uids": ["u1", "u2"], "title": "Hi", "body": "There"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["saved"].as_array().unwrap().len(), 2);
        assert_eq!(report["sent"]["success_count"], 1);
    }

    #[tokio::test]
    async fn seed_rejects_malformed_dates_and_counts_created() {
        let (_, router) = app();

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/v1/reminders/seed",
                r#"{"uid": "u1", "event_id": "evt-1", "event_title": "Party", "event_date": "soon"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router
            .oneshot(post_json(
                "/api/v1/reminders/seed",
                r#"{"uid": "u1", "event_id": "evt-1", "event_title": "Party",
                    "event_date": "2030-06-10T18:00:00", "test_every_minutes": 5}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["created"], 6);
    }

    #[tokio::test]
    async fn notify_change_reports_missing_audience() {
        let (_, router) = app();
        let response = router
            .oneshot(post_json(
                "/api/v1/events/evt-1/notify-change",
                r#"{"event_title": "Party"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["reason"], "no_attendees");
        assert!(body["sent"].is_null());
    }
}
