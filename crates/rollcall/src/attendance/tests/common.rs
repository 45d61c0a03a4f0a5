use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::attendance::aggregate::CumulativeAggregator;
use crate::attendance::domain::{
    Attendance, AttendanceRow, DistrictId, DistrictScope, Event, EventAttendanceSummary, EventId,
    EventKind, Role, Session, SessionId, SessionWindow, User, UserId, VoicePart,
};
use crate::attendance::repository::{
    AttendanceChange, AttendanceCommit, AttendanceStore, RepositoryError, ScheduleCommit,
};
use crate::attendance::{
    ActorContext, AttendanceApi, AttendanceService, MemoryStore, ScheduleService,
};
use crate::config::PolicyConfig;

pub(super) const NORTH: &str = "north";
pub(super) const SOUTH: &str = "south";

pub(super) const ADMIN: &str = "admin";
pub(super) const NORTH_LEADER: &str = "dl-north";
pub(super) const SOUTH_LEADER: &str = "dl-south";
pub(super) const TENOR_LEADER: &str = "pl-tenor-north";
pub(super) const TENOR_A: &str = "tenor-a";
pub(super) const BASS_A: &str = "bass-a";
pub(super) const TENOR_B: &str = "tenor-b";

pub(super) const EVENT: &str = "evt-spring";
pub(super) const WEEKLY_EVENT: &str = "evt-weekly";
pub(super) const SESSION: &str = "ses-first";
pub(super) const SECOND_SESSION: &str = "ses-second";
pub(super) const SOUTH_SESSION: &str = "ses-south";
pub(super) const WEEKLY_SESSION: &str = "ses-weekly-1";
pub(super) const SECOND_WEEKLY_SESSION: &str = "ses-weekly-2";

/// First rehearsal: Tuesday 2025-03-04, 19:00 to 21:00 UTC.
pub(super) fn session_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, 19, 0, 0).unwrap()
}

pub(super) fn at(offset_minutes: i64) -> DateTime<Utc> {
    session_start() + Duration::minutes(offset_minutes)
}

pub(super) fn user_id(id: &str) -> UserId {
    UserId(id.to_string())
}

pub(super) fn session_id(id: &str) -> SessionId {
    SessionId(id.to_string())
}

pub(super) fn event_id(id: &str) -> EventId {
    EventId(id.to_string())
}

pub(super) fn district(id: &str) -> DistrictId {
    DistrictId(id.to_string())
}

pub(super) fn user(id: &str, role: Role, district_id: &str, voice_part: Option<VoicePart>) -> User {
    User {
        id: user_id(id),
        name: id.replace('-', " "),
        role,
        district_id: district(district_id),
        voice_part,
    }
}

pub(super) fn users() -> Vec<User> {
    vec![
        user(ADMIN, Role::Admin, NORTH, None),
        user(NORTH_LEADER, Role::DistrictLeader, NORTH, None),
        user(SOUTH_LEADER, Role::DistrictLeader, SOUTH, None),
        user(TENOR_LEADER, Role::PartLeader, NORTH, Some(VoicePart::Tenor)),
        user(TENOR_A, Role::Member, NORTH, Some(VoicePart::Tenor)),
        user(BASS_A, Role::Member, NORTH, Some(VoicePart::Bass)),
        user(TENOR_B, Role::Member, SOUTH, Some(VoicePart::Tenor)),
    ]
}

pub(super) fn event(id: &str, scope: DistrictScope, weekly_constraint: bool) -> Event {
    Event {
        id: event_id(id),
        name: "Spring concert".to_string(),
        kind: EventKind::Rehearsal,
        scope,
        pass_mark: 75,
        weekly_constraint,
        minimum_minutes_per_week: weekly_constraint.then_some(240),
        starts_at: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        ends_at: Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap(),
        created_by: user_id(ADMIN),
    }
}

pub(super) fn session(
    id: &str,
    event: &str,
    district_id: &str,
    start: DateTime<Utc>,
    minutes: i64,
) -> Session {
    Session {
        id: session_id(id),
        event_id: event_id(event),
        district_id: district(district_id),
        title: Some(format!("Rehearsal {id}")),
        window: SessionWindow::new(start, start + Duration::minutes(minutes)).unwrap(),
        created_by: user_id(ADMIN),
    }
}

/// Store seeded with the roster, two events, and their sessions.
pub(super) fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for user in users() {
        store.insert_user(user).expect("user inserted");
    }

    store
        .insert_event(event(EVENT, DistrictScope::AllDistricts, false))
        .expect("event inserted");
    store
        .insert_event(event(
            WEEKLY_EVENT,
            DistrictScope::District(district(NORTH)),
            true,
        ))
        .expect("event inserted");

    let next_week = session_start() + Duration::days(7);
    for session in [
        session(SESSION, EVENT, NORTH, session_start(), 120),
        session(SECOND_SESSION, EVENT, NORTH, next_week, 120),
        session(SOUTH_SESSION, EVENT, SOUTH, session_start(), 120),
        session(WEEKLY_SESSION, WEEKLY_EVENT, NORTH, session_start(), 120),
        session(
            SECOND_WEEKLY_SESSION,
            WEEKLY_EVENT,
            NORTH,
            session_start() + Duration::days(2),
            120,
        ),
    ] {
        store.insert_session(session).expect("session inserted");
    }

    Arc::new(store)
}

pub(super) fn attendance_service(store: &Arc<MemoryStore>) -> AttendanceService<MemoryStore> {
    AttendanceService::new(store.clone(), PolicyConfig::default())
}

pub(super) fn schedule_service(store: &Arc<MemoryStore>) -> ScheduleService<MemoryStore> {
    ScheduleService::new(store.clone(), PolicyConfig::default())
}

pub(super) fn api(store: &Arc<MemoryStore>) -> Arc<AttendanceApi<MemoryStore>> {
    Arc::new(AttendanceApi::new(store.clone(), PolicyConfig::default()))
}

pub(super) fn context(store: &Arc<MemoryStore>, id: &str) -> ActorContext {
    let user = store
        .user(&user_id(id))
        .expect("store available")
        .expect("user seeded");
    ActorContext::direct(user)
}

pub(super) fn acting_as(store: &Arc<MemoryStore>, actual: &str, effective: &str) -> ActorContext {
    let actual = context(store, actual).actual().clone();
    let effective = context(store, effective).actual().clone();
    ActorContext::acting_as(actual, effective).expect("administrator may act as others")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Store whose backend is down.
pub(super) struct UnavailableStore;

fn unavailable<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl AttendanceStore for UnavailableStore {
    fn user(&self, _id: &UserId) -> Result<Option<User>, RepositoryError> {
        unavailable()
    }

    fn session(&self, _id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        unavailable()
    }

    fn event(&self, _id: &EventId) -> Result<Option<Event>, RepositoryError> {
        unavailable()
    }

    fn attendance(
        &self,
        _user_id: &UserId,
        _session_id: &SessionId,
    ) -> Result<Option<Attendance>, RepositoryError> {
        unavailable()
    }

    fn event_attendance(
        &self,
        _user_id: &UserId,
        _event_id: &EventId,
    ) -> Result<Vec<AttendanceRow>, RepositoryError> {
        unavailable()
    }

    fn session_attendance(
        &self,
        _session_id: &SessionId,
    ) -> Result<Vec<Attendance>, RepositoryError> {
        unavailable()
    }

    fn summary(
        &self,
        _user_id: &UserId,
        _event_id: &EventId,
    ) -> Result<Option<EventAttendanceSummary>, RepositoryError> {
        unavailable()
    }

    fn commit_attendance(
        &self,
        _change: AttendanceChange,
        _aggregator: &CumulativeAggregator,
    ) -> Result<AttendanceCommit, RepositoryError> {
        unavailable()
    }

    fn refresh_summary(
        &self,
        _user_id: &UserId,
        _event_id: &EventId,
        _aggregator: &CumulativeAggregator,
    ) -> Result<EventAttendanceSummary, RepositoryError> {
        unavailable()
    }

    fn set_skip(
        &self,
        _user_id: &UserId,
        _event_id: &EventId,
        _skip: bool,
        _aggregator: &CumulativeAggregator,
    ) -> Result<EventAttendanceSummary, RepositoryError> {
        unavailable()
    }

    fn insert_user(&self, _user: User) -> Result<User, RepositoryError> {
        unavailable()
    }

    fn insert_event(&self, _event: Event) -> Result<Event, RepositoryError> {
        unavailable()
    }

    fn update_event(
        &self,
        _event: Event,
        _aggregator: &CumulativeAggregator,
    ) -> Result<ScheduleCommit<Event>, RepositoryError> {
        unavailable()
    }

    fn delete_event(&self, _id: &EventId) -> Result<Event, RepositoryError> {
        unavailable()
    }

    fn insert_session(&self, _session: Session) -> Result<Session, RepositoryError> {
        unavailable()
    }

    fn update_session(
        &self,
        _session: Session,
        _aggregator: &CumulativeAggregator,
    ) -> Result<ScheduleCommit<Session>, RepositoryError> {
        unavailable()
    }

    fn delete_session(&self, _id: &SessionId) -> Result<Session, RepositoryError> {
        unavailable()
    }
}

type CommitHook = Box<dyn FnOnce(&MemoryStore) + Send>;

/// Memory store that runs a competing write right before the next attendance commit, standing
/// in for a request that lands between a service's checks and its write.
pub(super) struct InterleavingStore {
    inner: Arc<MemoryStore>,
    before_commit: Mutex<Option<CommitHook>>,
}

impl InterleavingStore {
    pub(super) fn new(
        inner: Arc<MemoryStore>,
        hook: impl FnOnce(&MemoryStore) + Send + 'static,
    ) -> Self {
        Self {
            inner,
            before_commit: Mutex::new(Some(Box::new(hook))),
        }
    }
}

impl AttendanceStore for InterleavingStore {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.inner.user(id)
    }

    fn session(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        self.inner.session(id)
    }

    fn event(&self, id: &EventId) -> Result<Option<Event>, RepositoryError> {
        self.inner.event(id)
    }

    fn attendance(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<Option<Attendance>, RepositoryError> {
        self.inner.attendance(user_id, session_id)
    }

    fn event_attendance(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Vec<AttendanceRow>, RepositoryError> {
        self.inner.event_attendance(user_id, event_id)
    }

    fn session_attendance(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<Attendance>, RepositoryError> {
        self.inner.session_attendance(session_id)
    }

    fn summary(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Option<EventAttendanceSummary>, RepositoryError> {
        self.inner.summary(user_id, event_id)
    }

    fn commit_attendance(
        &self,
        change: AttendanceChange,
        aggregator: &CumulativeAggregator,
    ) -> Result<AttendanceCommit, RepositoryError> {
        let hook = self.before_commit.lock().expect("hook lock").take();
        if let Some(hook) = hook {
            hook(self.inner.as_ref());
        }
        self.inner.commit_attendance(change, aggregator)
    }

    fn refresh_summary(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        aggregator: &CumulativeAggregator,
    ) -> Result<EventAttendanceSummary, RepositoryError> {
        self.inner.refresh_summary(user_id, event_id, aggregator)
    }

    fn set_skip(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        skip: bool,
        aggregator: &CumulativeAggregator,
    ) -> Result<EventAttendanceSummary, RepositoryError> {
        self.inner.set_skip(user_id, event_id, skip, aggregator)
    }

    fn insert_user(&self, user: User) -> Result<User, RepositoryError> {
        self.inner.insert_user(user)
    }

    fn insert_event(&self, event: Event) -> Result<Event, RepositoryError> {
        self.inner.insert_event(event)
    }

    fn update_event(
        &self,
        event: Event,
        aggregator: &CumulativeAggregator,
    ) -> Result<ScheduleCommit<Event>, RepositoryError> {
        self.inner.update_event(event, aggregator)
    }

    fn delete_event(&self, id: &EventId) -> Result<Event, RepositoryError> {
        self.inner.delete_event(id)
    }

    fn insert_session(&self, session: Session) -> Result<Session, RepositoryError> {
        self.inner.insert_session(session)
    }

    fn update_session(
        &self,
        session: Session,
        aggregator: &CumulativeAggregator,
    ) -> Result<ScheduleCommit<Session>, RepositoryError> {
        self.inner.update_session(session, aggregator)
    }

    fn delete_session(&self, id: &SessionId) -> Result<Session, RepositoryError> {
        self.inner.delete_session(id)
    }
}
