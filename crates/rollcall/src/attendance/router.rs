use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::access::{self, AccessTarget, ActorContext, Operation};
use super::domain::{EventId, SessionId, UserId};
use super::error::AttendanceError;
use super::repository::AttendanceStore;
use super::schedule::{EventDraft, EventPatch, ScheduleService, SessionDraft, SessionPatch};
use super::service::{load_user, AttendanceService};
use super::window::WindowStatus;
use crate::config::PolicyConfig;

/// Header naming the caller.
pub const ACTOR_HEADER: &str = "x-actor-id";
/// Optional header naming the user an administrator acts as.
pub const ACT_AS_HEADER: &str = "x-act-as";

/// Shared state behind the attendance routes.
pub struct AttendanceApi<S> {
    pub attendance: AttendanceService<S>,
    pub schedule: ScheduleService<S>,
}

impl<S> AttendanceApi<S>
where
    S: AttendanceStore + 'static,
{
    pub fn new(store: Arc<S>, policy: PolicyConfig) -> Self {
        Self {
            attendance: AttendanceService::new(store.clone(), policy),
            schedule: ScheduleService::new(store, policy),
        }
    }
}

/// Router builder exposing attendance, exemption, window, and schedule endpoints.
pub fn attendance_router<S>(api: Arc<AttendanceApi<S>>) -> Router
where
    S: AttendanceStore + 'static,
{
    Router::new()
        .route("/api/v1/attendance", post(submit_handler::<S>))
        .route(
            "/api/v1/attendance/:user_id/:session_id",
            put(update_handler::<S>).delete(delete_handler::<S>),
        )
        .route(
            "/api/v1/events/:event_id/attendance/:user_id",
            get(standing_handler::<S>),
        )
        .route(
            "/api/v1/events/:event_id/attendance/:user_id/recompute",
            post(recompute_handler::<S>),
        )
        .route(
            "/api/v1/events/:event_id/exemptions/:user_id",
            put(exemption_handler::<S>),
        )
        .route("/api/v1/sessions/:session_id/window", get(window_handler::<S>))
        .route("/api/v1/access/check", post(access_handler::<S>))
        .route("/api/v1/events", post(create_event_handler::<S>))
        .route(
            "/api/v1/events/:event_id",
            get(event_handler::<S>)
                .patch(update_event_handler::<S>)
                .delete(delete_event_handler::<S>),
        )
        .route("/api/v1/sessions", post(create_session_handler::<S>))
        .route(
            "/api/v1/sessions/:session_id",
            get(session_handler::<S>)
                .patch(update_session_handler::<S>)
                .delete(delete_session_handler::<S>),
        )
        .with_state(api)
}

impl IntoResponse for AttendanceError {
    fn into_response(self) -> Response {
        let status = match &self {
            AttendanceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AttendanceError::Forbidden(_) => StatusCode::FORBIDDEN,
            AttendanceError::Conflict { .. } => StatusCode::CONFLICT,
            AttendanceError::NotFound(_) => StatusCode::NOT_FOUND,
            AttendanceError::Repository(err) => {
                error!(error = %err, "attendance store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut payload = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        if let AttendanceError::Conflict { edit_allowed, .. } = &self {
            payload["edit_allowed"] = json!(edit_allowed);
        }
        (status, Json(payload)).into_response()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    /// Defaults to the effective actor.
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub session_id: SessionId,
    pub arrival_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArrivalRequest {
    pub arrival_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExemptionRequest {
    pub skip: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessCheckRequest {
    pub operation: Operation,
    #[serde(default)]
    pub target: AccessTarget,
}

#[derive(Debug, Clone, Serialize)]
struct WindowView {
    session_id: SessionId,
    #[serde(flatten)]
    status: WindowStatus,
    is_open: bool,
    minutes_remaining: i64,
}

fn actor_context<S>(api: &AttendanceApi<S>, headers: &HeaderMap) -> Result<ActorContext, Response>
where
    S: AttendanceStore + 'static,
{
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| UserId(value.to_string()))
    };

    let Some(actor_id) = header(ACTOR_HEADER) else {
        let payload = json!({
            "error": format!("missing {ACTOR_HEADER} header"),
            "code": "unauthenticated",
        });
        return Err((StatusCode::UNAUTHORIZED, Json(payload)).into_response());
    };
    let act_as = header(ACT_AS_HEADER);

    api.attendance
        .resolve_context(&actor_id, act_as.as_ref())
        .map_err(IntoResponse::into_response)
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, AttendanceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn submit_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    headers: HeaderMap,
    Json(request): Json<SubmitRequest>,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    let user_id = request
        .user_id
        .unwrap_or_else(|| context.effective().id.clone());

    respond(
        StatusCode::CREATED,
        api.attendance.submit(
            &context,
            &user_id,
            &request.session_id,
            request.arrival_time,
            Utc::now(),
        ),
    )
}

pub(crate) async fn update_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    Path((user_id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<ArrivalRequest>,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        api.attendance.update_attendance(
            &context,
            &UserId(user_id),
            &SessionId(session_id),
            request.arrival_time,
            Utc::now(),
        ),
    )
}

pub(crate) async fn delete_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    Path((user_id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        api.attendance.delete_attendance(
            &context,
            &UserId(user_id),
            &SessionId(session_id),
            Utc::now(),
        ),
    )
}

pub(crate) async fn standing_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    Path((event_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        api.attendance
            .event_standing(&context, &UserId(user_id), &EventId(event_id)),
    )
}

pub(crate) async fn recompute_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    Path((event_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    let user_id = UserId(user_id);
    let event_id = EventId(event_id);

    let result = load_user(api.attendance.store().as_ref(), &user_id).and_then(|user| {
        access::require(&context, Operation::ViewAttendance, &AccessTarget::user(&user))?;
        api.attendance.recompute_summary(&user_id, &event_id)
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn exemption_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    Path((event_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<ExemptionRequest>,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        api.attendance
            .set_skip(&context, &UserId(user_id), &EventId(event_id), request.skip),
    )
}

pub(crate) async fn window_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let session_id = SessionId(session_id);
    let result = api
        .attendance
        .window_status(&session_id, Utc::now())
        .map(|status| WindowView {
            session_id: session_id.clone(),
            status,
            is_open: status.is_open(),
            minutes_remaining: status.minutes_remaining(),
        });
    respond(StatusCode::OK, result)
}

pub(crate) async fn access_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    headers: HeaderMap,
    Json(request): Json<AccessCheckRequest>,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    let decision = api
        .attendance
        .check_access(&context, request.operation, &request.target);
    let payload = json!({
        "operation": request.operation,
        "decision": decision,
        "actual": context.actual().id,
        "effective": context.effective().id,
    });
    (StatusCode::OK, Json(payload)).into_response()
}

pub(crate) async fn create_event_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    headers: HeaderMap,
    Json(draft): Json<EventDraft>,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(StatusCode::CREATED, api.schedule.create_event(&context, draft))
}

pub(crate) async fn event_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    Path(event_id): Path<String>,
) -> Response
where
    S: AttendanceStore + 'static,
{
    respond(StatusCode::OK, api.schedule.event(&EventId(event_id)))
}

pub(crate) async fn update_event_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<EventPatch>,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        api.schedule.update_event(&context, &EventId(event_id), patch),
    )
}

pub(crate) async fn delete_event_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        api.schedule.delete_event(&context, &EventId(event_id)),
    )
}

pub(crate) async fn create_session_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    headers: HeaderMap,
    Json(draft): Json<SessionDraft>,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(StatusCode::CREATED, api.schedule.create_session(&context, draft))
}

pub(crate) async fn session_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: AttendanceStore + 'static,
{
    respond(StatusCode::OK, api.schedule.session(&SessionId(session_id)))
}

pub(crate) async fn update_session_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<SessionPatch>,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        api.schedule
            .update_session(&context, &SessionId(session_id), patch),
    )
}

pub(crate) async fn delete_session_handler<S>(
    State(api): State<Arc<AttendanceApi<S>>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: AttendanceStore + 'static,
{
    let context = match actor_context(&api, &headers) {
        Ok(context) => context,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        api.schedule.delete_session(&context, &SessionId(session_id)),
    )
}
