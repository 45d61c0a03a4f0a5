use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::attendance::{attendance_router, AttendanceApi, ACTOR_HEADER, ACT_AS_HEADER};
use crate::config::PolicyConfig;

fn request(method: Method, uri: &str, actor: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header(ACTOR_HEADER, actor);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("route executes");
    let status = response.status();
    (status, read_json_body(response).await)
}

/// Creates a north event and a session that started half an hour ago.
async fn live_session(router: &Router) -> (String, DateTime<Utc>) {
    let now = Utc::now();
    let (status, event) = send(
        router,
        request(
            Method::POST,
            "/api/v1/events",
            Some(ADMIN),
            Some(json!({
                "name": "Live rehearsal block",
                "kind": "rehearsal",
                "scope": { "scope": "district", "district_id": NORTH },
                "pass_mark": 70,
                "starts_at": now - Duration::days(1),
                "ends_at": now + Duration::days(30),
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{event}");

    let event_id = event["id"].clone();
    let start = now - Duration::minutes(30);
    let (status, session) = send(
        router,
        request(
            Method::POST,
            "/api/v1/sessions",
            Some(ADMIN),
            Some(json!({
                "event_id": event_id,
                "start_time": start,
                "end_time": start + Duration::minutes(120),
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{session}");

    let id = session["id"].as_str().expect("session id").to_string();
    (id, start)
}

#[tokio::test]
async fn requests_without_an_actor_are_unauthorized() {
    let store = seeded_store();
    let router = attendance_router(api(&store));

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/api/v1/attendance",
            None,
            Some(json!({ "session_id": SESSION, "arrival_time": at(0) })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn member_submission_then_duplicate_conflicts() {
    let store = seeded_store();
    let router = attendance_router(api(&store));
    let (session, start) = live_session(&router).await;

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/api/v1/attendance",
            Some(TENOR_A),
            Some(json!({ "session_id": session, "arrival_time": start })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["attendance"]["percentage_score"], json!(100.0));
    assert_eq!(body["summary"]["cumulative"], json!(100.0));

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/api/v1/attendance",
            Some(TENOR_A),
            Some(json!({ "session_id": session, "arrival_time": start })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "attendance_exists");
    assert_eq!(body["edit_allowed"], json!(false));
}

#[tokio::test]
async fn leader_can_correct_and_read_standing() {
    let store = seeded_store();
    let router = attendance_router(api(&store));
    let (session, start) = live_session(&router).await;

    let (status, _) = send(
        &router,
        request(
            Method::POST,
            "/api/v1/attendance",
            Some(TENOR_A),
            Some(json!({
                "session_id": session,
                "arrival_time": start + Duration::minutes(25),
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/v1/attendance/{TENOR_A}/{session}"),
            Some(TENOR_LEADER),
            Some(json!({ "arrival_time": start })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["attendance"]["percentage_score"], json!(100.0));

    let event_id = body["attendance"]["event_id"]
        .as_str()
        .expect("event id")
        .to_string();
    let (status, standing) = send(
        &router,
        request(
            Method::GET,
            &format!("/api/v1/events/{event_id}/attendance/{TENOR_A}"),
            Some(TENOR_A),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(standing["meets_pass_mark"], json!(true));
    assert_eq!(standing["attendance"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn window_endpoint_reports_state_and_minutes() {
    let store = seeded_store();
    let router = attendance_router(api(&store));
    let (session, _) = live_session(&router).await;

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            &format!("/api/v1/sessions/{session}/window"),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "open");
    assert_eq!(body["is_open"], json!(true));
    assert!(body["minutes_remaining"].as_i64().unwrap_or_default() > 0);

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            &format!("/api/v1/sessions/{SESSION}/window"),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "closed");
    assert_eq!(body["minutes_remaining"], json!(-1));

    let (status, body) = send(
        &router,
        request(Method::GET, "/api/v1/sessions/missing/window", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn closed_window_is_forbidden_for_members() {
    let store = seeded_store();
    let router = attendance_router(api(&store));

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/api/v1/attendance",
            Some(TENOR_A),
            Some(json!({ "session_id": SESSION, "arrival_time": at(0) })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "submission_window_closed");
}

#[tokio::test]
async fn impersonation_header_is_reserved_for_administrators() {
    let store = seeded_store();
    let router = attendance_router(api(&store));

    let mut denied = request(
        Method::POST,
        "/api/v1/access/check",
        Some(NORTH_LEADER),
        Some(json!({ "operation": "view_attendance" })),
    );
    denied
        .headers_mut()
        .insert(ACT_AS_HEADER, TENOR_A.parse().unwrap());
    let (status, _) = send(&router, denied).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut allowed = request(
        Method::POST,
        "/api/v1/access/check",
        Some(ADMIN),
        Some(json!({
            "operation": "edit_attendance",
            "target": {
                "owner": TENOR_A,
                "district": { "scope": "district", "district_id": NORTH },
                "voice_part": "TENOR",
            },
        })),
    );
    allowed
        .headers_mut()
        .insert(ACT_AS_HEADER, TENOR_A.parse().unwrap());
    let (status, body) = send(&router, allowed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"], "deny");
    assert_eq!(body["actual"], ADMIN);
    assert_eq!(body["effective"], TENOR_A);
}

#[tokio::test]
async fn part_leader_access_check_follows_voice_part() {
    let store = seeded_store();
    let router = attendance_router(api(&store));

    let check = |part: &str| {
        request(
            Method::POST,
            "/api/v1/access/check",
            Some(TENOR_LEADER),
            Some(json!({
                "operation": "submit_attendance",
                "target": {
                    "district": { "scope": "district", "district_id": NORTH },
                    "voice_part": part,
                },
            })),
        )
    };

    let (_, tenor) = send(&router, check("TENOR")).await;
    assert_eq!(tenor["decision"], "allow");
    let (_, bass) = send(&router, check("BASS")).await;
    assert_eq!(bass["decision"], "deny");
}

#[tokio::test]
async fn exemptions_and_recompute_round_through_http() {
    let store = seeded_store();
    let router = attendance_router(api(&store));

    let (status, body) = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/v1/events/{EVENT}/exemptions/{BASS_A}"),
            Some(NORTH_LEADER),
            Some(json!({ "skip": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["skip"], json!(true));
    assert_eq!(body["cumulative"], json!(100.0));

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/events/{EVENT}/attendance/{BASS_A}/recompute"),
            Some(BASS_A),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cumulative"], json!(100.0));
}

#[tokio::test]
async fn invalid_schedule_input_is_unprocessable() {
    let store = seeded_store();
    let router = attendance_router(api(&store));
    let start = at(0);

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/api/v1/sessions",
            Some(ADMIN),
            Some(json!({
                "event_id": EVENT,
                "district_id": NORTH,
                "start_time": start,
                "end_time": start - Duration::minutes(1),
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_failed");

    let (status, body) = send(
        &router,
        request(Method::DELETE, &format!("/api/v1/events/{EVENT}"), Some(TENOR_A), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn repository_failures_map_to_internal_errors() {
    let api = Arc::new(AttendanceApi::new(
        Arc::new(UnavailableStore),
        PolicyConfig::default(),
    ));
    let router = attendance_router(api);

    let (status, body) = send(
        &router,
        request(Method::DELETE, &format!("/api/v1/sessions/{SESSION}"), Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "repository_unavailable");
}
