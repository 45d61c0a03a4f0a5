use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::access::{self, AccessTarget, ActorContext, Operation};
use super::aggregate::CumulativeAggregator;
use super::domain::{
    DistrictId, DistrictScope, Event, EventId, EventKind, Session, SessionId, SessionWindow,
};
use super::error::{AttendanceError, NotFound, ValidationError};
use super::repository::{AttendanceStore, RepositoryError};
use super::service::{load_event, load_session};
use crate::config::PolicyConfig;

static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_event_id() -> EventId {
    let id = EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EventId(format!("evt-{id:06}"))
}

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("ses-{id:06}"))
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventDraft {
    pub name: String,
    pub kind: EventKind,
    pub scope: DistrictScope,
    pub pass_mark: u8,
    #[serde(default)]
    pub weekly_constraint: bool,
    #[serde(default)]
    pub minimum_minutes_per_week: Option<u32>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Partial event update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventPatch {
    pub name: Option<String>,
    pub kind: Option<EventKind>,
    pub scope: Option<DistrictScope>,
    pub pass_mark: Option<u8>,
    pub weekly_constraint: Option<bool>,
    pub minimum_minutes_per_week: Option<u32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionDraft {
    pub event_id: EventId,
    /// Defaults to the event's district, or the creator's for multi-district events.
    #[serde(default)]
    pub district_id: Option<DistrictId>,
    #[serde(default)]
    pub title: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Updated session and how many attendance rows were rescored against its new times.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUpdate {
    pub session: Session,
    pub rescored: usize,
}

/// Event and session lifecycle. Keeps stored scores and summaries in line with schedule edits.
pub struct ScheduleService<S> {
    store: Arc<S>,
    aggregator: CumulativeAggregator,
}

impl<S> ScheduleService<S>
where
    S: AttendanceStore + 'static,
{
    pub fn new(store: Arc<S>, policy: PolicyConfig) -> Self {
        Self {
            store,
            aggregator: CumulativeAggregator::new(policy.weekly_minimum_minutes),
        }
    }

    pub fn event(&self, id: &EventId) -> Result<Event, AttendanceError> {
        load_event(self.store.as_ref(), id)
    }

    pub fn session(&self, id: &SessionId) -> Result<Session, AttendanceError> {
        load_session(self.store.as_ref(), id)
    }

    pub fn create_event(
        &self,
        context: &ActorContext,
        draft: EventDraft,
    ) -> Result<Event, AttendanceError> {
        access::require(
            context,
            Operation::CreateEvent,
            &AccessTarget::scope(draft.scope.clone()),
        )?;

        let event = Event {
            id: next_event_id(),
            name: draft.name,
            kind: draft.kind,
            scope: draft.scope,
            pass_mark: draft.pass_mark,
            weekly_constraint: draft.weekly_constraint,
            minimum_minutes_per_week: draft.minimum_minutes_per_week,
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            created_by: context.effective().id.clone(),
        };
        let event = self.normalize_event(event)?;
        let event = self.store.insert_event(event)?;

        info!(event = %event.id, created_by = %event.created_by, "event created");
        Ok(event)
    }

    pub fn update_event(
        &self,
        context: &ActorContext,
        id: &EventId,
        patch: EventPatch,
    ) -> Result<Event, AttendanceError> {
        let current = load_event(self.store.as_ref(), id)?;
        let target = AccessTarget::event(&current);
        access::require(context, Operation::EditEvent, &target)?;

        let scope_changed = patch.scope.as_ref().is_some_and(|scope| *scope != current.scope);
        let kind_changed = patch.kind.is_some_and(|kind| kind != current.kind);
        if scope_changed || kind_changed {
            access::require(context, Operation::ChangeEventScope, &target)?;
        }

        let updated = Event {
            name: patch.name.unwrap_or(current.name),
            kind: patch.kind.unwrap_or(current.kind),
            scope: patch.scope.unwrap_or(current.scope),
            pass_mark: patch.pass_mark.unwrap_or(current.pass_mark),
            weekly_constraint: patch.weekly_constraint.unwrap_or(current.weekly_constraint),
            minimum_minutes_per_week: patch
                .minimum_minutes_per_week
                .or(current.minimum_minutes_per_week),
            starts_at: patch.starts_at.unwrap_or(current.starts_at),
            ends_at: patch.ends_at.unwrap_or(current.ends_at),
            ..current
        };
        let updated = self.normalize_event(updated)?;
        let commit = self
            .store
            .update_event(updated, &self.aggregator)
            .map_err(|err| match err {
                RepositoryError::NotFound => NotFound::Event(id.clone()).into(),
                other => AttendanceError::from(other),
            })?;

        info!(event = %id, refreshed = commit.refreshed, "event updated");
        Ok(commit.record)
    }

    pub fn delete_event(
        &self,
        context: &ActorContext,
        id: &EventId,
    ) -> Result<Event, AttendanceError> {
        let event = load_event(self.store.as_ref(), id)?;
        access::require(context, Operation::DeleteEvent, &AccessTarget::event(&event))?;

        let removed = self.store.delete_event(id).map_err(|err| match err {
            RepositoryError::InUse { count } => ValidationError::HasAttendance {
                resource: format!("event {id}"),
                count,
            }
            .into(),
            RepositoryError::NotFound => NotFound::Event(id.clone()).into(),
            other => AttendanceError::from(other),
        })?;
        info!(event = %id, "event deleted");
        Ok(removed)
    }

    pub fn create_session(
        &self,
        context: &ActorContext,
        draft: SessionDraft,
    ) -> Result<Session, AttendanceError> {
        let event = load_event(self.store.as_ref(), &draft.event_id)?;
        let district_id = match draft.district_id {
            Some(district) => district,
            None => event
                .scope
                .district()
                .cloned()
                .unwrap_or_else(|| context.effective().district_id.clone()),
        };

        access::require(
            context,
            Operation::CreateSession,
            &AccessTarget::scope(DistrictScope::District(district_id.clone())),
        )?;
        ensure_within_event(&event, &district_id)?;
        let window = SessionWindow::new(draft.start_time, draft.end_time)?;

        let session = Session {
            id: next_session_id(),
            event_id: event.id,
            district_id,
            title: draft.title,
            window,
            created_by: context.effective().id.clone(),
        };
        let session = self.store.insert_session(session).map_err(|err| match err {
            RepositoryError::NotFound => NotFound::Event(draft.event_id.clone()).into(),
            other => AttendanceError::from(other),
        })?;

        info!(
            session = %session.id,
            event = %session.event_id,
            duration_minutes = session.window.duration_minutes(),
            "session created"
        );
        Ok(session)
    }

    /// Apply a session edit. New start or end times rescore every row already recorded for it.
    /// Once a session has attendance only its times may change.
    pub fn update_session(
        &self,
        context: &ActorContext,
        id: &SessionId,
        patch: SessionPatch,
    ) -> Result<SessionUpdate, AttendanceError> {
        let current = load_session(self.store.as_ref(), id)?;
        access::require(context, Operation::EditSession, &AccessTarget::session(&current))?;

        let window = SessionWindow::new(
            patch.start_time.unwrap_or(current.window.start()),
            patch.end_time.unwrap_or(current.window.end()),
        )?;

        let updated = Session {
            title: patch.title.or(current.title),
            window,
            ..current
        };
        let commit = self
            .store
            .update_session(updated, &self.aggregator)
            .map_err(|err| match err {
                RepositoryError::InUse { count } => ValidationError::SessionLocked {
                    session_id: id.clone(),
                    count,
                }
                .into(),
                RepositoryError::NotFound => NotFound::Session(id.clone()).into(),
                other => AttendanceError::from(other),
            })?;

        info!(
            session = %id,
            rescored = commit.rescored,
            refreshed = commit.refreshed,
            "session updated"
        );
        Ok(SessionUpdate {
            session: commit.record,
            rescored: commit.rescored,
        })
    }

    pub fn delete_session(
        &self,
        context: &ActorContext,
        id: &SessionId,
    ) -> Result<Session, AttendanceError> {
        let session = load_session(self.store.as_ref(), id)?;
        access::require(context, Operation::DeleteSession, &AccessTarget::session(&session))?;

        let removed = self.store.delete_session(id).map_err(|err| match err {
            RepositoryError::InUse { count } => ValidationError::HasAttendance {
                resource: format!("session {id}"),
                count,
            }
            .into(),
            RepositoryError::NotFound => NotFound::Session(id.clone()).into(),
            other => AttendanceError::from(other),
        })?;
        info!(session = %id, "session deleted");
        Ok(removed)
    }

    fn normalize_event(&self, mut event: Event) -> Result<Event, ValidationError> {
        if event.pass_mark > 100 {
            return Err(ValidationError::PassMarkOutOfRange(event.pass_mark));
        }
        if event.ends_at < event.starts_at {
            return Err(ValidationError::InvalidEventRange {
                start: event.starts_at,
                end: event.ends_at,
            });
        }
        if event.weekly_constraint {
            match event.minimum_minutes_per_week {
                Some(0) => return Err(ValidationError::MissingWeeklyMinimum),
                Some(_) => {}
                None => {
                    event.minimum_minutes_per_week =
                        Some(self.aggregator.minimum_minutes_for(&event));
                }
            }
        }
        Ok(event)
    }
}

fn ensure_within_event(event: &Event, district_id: &DistrictId) -> Result<(), ValidationError> {
    if event.scope.includes(district_id) {
        Ok(())
    } else {
        Err(ValidationError::SessionOutsideEventDistrict {
            event_id: event.id.clone(),
            session_district: district_id.to_string(),
        })
    }
}
