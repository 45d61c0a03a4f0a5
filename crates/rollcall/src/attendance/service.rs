use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::access::{self, AccessDecision, AccessTarget, ActorContext, Operation};
use super::aggregate::CumulativeAggregator;
use super::domain::{
    Attendance, AttendanceId, Event, EventAttendanceSummary, EventId, Session, SessionId, User,
    UserId,
};
use super::error::{AttendanceError, ForbiddenError, NotFound, ValidationError};
use super::repository::{AttendanceChange, AttendanceStore, RepositoryError};
use super::scoring::ScoreBreakdown;
use super::window::{self, SubmissionWindow, WindowStatus};
use crate::config::PolicyConfig;

static ATTENDANCE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_attendance_id() -> AttendanceId {
    let id = ATTENDANCE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AttendanceId(format!("att-{id:06}"))
}

/// Stored attendance together with the score breakdown and the refreshed standing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionOutcome {
    pub attendance: Attendance,
    pub breakdown: ScoreBreakdown,
    pub summary: EventAttendanceSummary,
}

/// A user's rows for one event plus their standing against the pass mark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventStanding {
    pub attendance: Vec<Attendance>,
    pub summary: EventAttendanceSummary,
    pub pass_mark: u8,
    pub meets_pass_mark: bool,
}

/// Service composing the access matrix, submission window, scorer, and aggregator.
pub struct AttendanceService<S> {
    store: Arc<S>,
    aggregator: CumulativeAggregator,
    window: SubmissionWindow,
}

impl<S> AttendanceService<S>
where
    S: AttendanceStore + 'static,
{
    pub fn new(store: Arc<S>, policy: PolicyConfig) -> Self {
        Self {
            store,
            aggregator: CumulativeAggregator::new(policy.weekly_minimum_minutes),
            window: SubmissionWindow::new(policy.window_length()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn aggregator(&self) -> &CumulativeAggregator {
        &self.aggregator
    }

    /// Build the actor context for a request, optionally acting as another user.
    pub fn resolve_context(
        &self,
        actor_id: &UserId,
        act_as: Option<&UserId>,
    ) -> Result<ActorContext, AttendanceError> {
        let actor = load_user(self.store.as_ref(), actor_id)?;
        match act_as {
            Some(effective_id) if effective_id != actor_id => {
                let effective = load_user(self.store.as_ref(), effective_id)?;
                let context = ActorContext::acting_as(actor, effective)?;
                debug!(actual = %actor_id, effective = %effective_id, "acting on behalf of user");
                Ok(context)
            }
            _ => Ok(ActorContext::direct(actor)),
        }
    }

    pub fn check_access(
        &self,
        context: &ActorContext,
        operation: Operation,
        target: &AccessTarget,
    ) -> AccessDecision {
        access::check_access(context, operation, target)
    }

    /// Record a first attendance for `(user_id, session_id)` and refresh the event standing.
    pub fn submit(
        &self,
        context: &ActorContext,
        user_id: &UserId,
        session_id: &SessionId,
        arrival_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, AttendanceError> {
        let user = load_user(self.store.as_ref(), user_id)?;
        let session = load_session(self.store.as_ref(), session_id)?;
        let event = load_event(self.store.as_ref(), &session.event_id)?;

        access::require(context, Operation::SubmitAttendance, &AccessTarget::user(&user))?;
        validate_arrival(arrival_time, now)?;
        ensure_same_district(&user, &session)?;
        self.ensure_not_skipped(&user, &event)?;
        window::admit(&self.window, context.actual().role, &session, &event, now)?;

        if self.store.attendance(user_id, session_id)?.is_some() {
            return Err(self.conflict(context, &user, session_id));
        }

        let record = Attendance {
            id: next_attendance_id(),
            user_id: user.id.clone(),
            session_id: session.id.clone(),
            event_id: event.id.clone(),
            arrival_time,
            percentage_score: 0.0,
            recorded_by: context.actual().id.clone(),
            recorded_at: now,
        };

        let commit = self
            .store
            .commit_attendance(AttendanceChange::Insert(record), &self.aggregator)
            .map_err(|err| match err {
                RepositoryError::Conflict => self.conflict(context, &user, session_id),
                RepositoryError::NotFound => NotFound::Session(session_id.clone()).into(),
                RepositoryError::Exempt => skipped(&user, &event),
                other => other.into(),
            })?;
        let breakdown = committed_breakdown(commit.breakdown)?;

        info!(
            user = %user.id,
            session = %session.id,
            recorded_by = %context.actual().id,
            score = breakdown.percentage_score,
            cumulative = commit.summary.cumulative,
            "attendance recorded"
        );

        Ok(SubmissionOutcome {
            attendance: commit.attendance,
            breakdown,
            summary: commit.summary,
        })
    }

    /// Elevated-edit path: rescore an existing row with a corrected arrival time.
    pub fn update_attendance(
        &self,
        context: &ActorContext,
        user_id: &UserId,
        session_id: &SessionId,
        arrival_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, AttendanceError> {
        let user = load_user(self.store.as_ref(), user_id)?;
        let session = load_session(self.store.as_ref(), session_id)?;
        let event = load_event(self.store.as_ref(), &session.event_id)?;

        access::require(context, Operation::EditAttendance, &AccessTarget::user(&user))?;
        validate_arrival(arrival_time, now)?;
        self.ensure_not_skipped(&user, &event)?;
        window::admit(&self.window, context.actual().role, &session, &event, now)?;

        let existing = self
            .store
            .attendance(user_id, session_id)?
            .ok_or_else(|| missing_attendance(user_id, session_id))?;

        let record = Attendance {
            arrival_time,
            recorded_by: context.actual().id.clone(),
            recorded_at: now,
            ..existing
        };

        let commit = self
            .store
            .commit_attendance(AttendanceChange::Update(record), &self.aggregator)
            .map_err(|err| match err {
                RepositoryError::NotFound => missing_attendance(user_id, session_id),
                RepositoryError::Exempt => skipped(&user, &event),
                other => other.into(),
            })?;
        let breakdown = committed_breakdown(commit.breakdown)?;

        info!(
            user = %user.id,
            session = %session.id,
            recorded_by = %context.actual().id,
            score = breakdown.percentage_score,
            cumulative = commit.summary.cumulative,
            "attendance updated"
        );

        Ok(SubmissionOutcome {
            attendance: commit.attendance,
            breakdown,
            summary: commit.summary,
        })
    }

    /// Remove a row through the elevated-edit path. Gated like an edit.
    pub fn delete_attendance(
        &self,
        context: &ActorContext,
        user_id: &UserId,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<EventAttendanceSummary, AttendanceError> {
        let user = load_user(self.store.as_ref(), user_id)?;
        let session = load_session(self.store.as_ref(), session_id)?;
        let event = load_event(self.store.as_ref(), &session.event_id)?;

        access::require(context, Operation::EditAttendance, &AccessTarget::user(&user))?;
        window::admit(&self.window, context.actual().role, &session, &event, now)?;

        let change = AttendanceChange::Delete {
            user_id: user_id.clone(),
            session_id: session_id.clone(),
        };
        let commit = self
            .store
            .commit_attendance(change, &self.aggregator)
            .map_err(|err| match err {
                RepositoryError::NotFound => missing_attendance(user_id, session_id),
                other => other.into(),
            })?;

        info!(user = %user_id, session = %session_id, "attendance deleted");
        Ok(commit.summary)
    }

    /// Recompute and persist the standing of `user_id` for `event_id`.
    pub fn recompute_summary(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<EventAttendanceSummary, AttendanceError> {
        load_user(self.store.as_ref(), user_id)?;
        load_event(self.store.as_ref(), event_id)?;

        let summary = self
            .store
            .refresh_summary(user_id, event_id, &self.aggregator)
            .map_err(|err| match err {
                RepositoryError::NotFound => NotFound::Event(event_id.clone()).into(),
                other => AttendanceError::from(other),
            })?;
        debug!(
            user = %user_id,
            event = %event_id,
            cumulative = summary.cumulative,
            "summary recomputed"
        );
        Ok(summary)
    }

    /// Grant or revoke an exemption. Exempt users hold a fixed standing of 100.
    pub fn set_skip(
        &self,
        context: &ActorContext,
        user_id: &UserId,
        event_id: &EventId,
        skip: bool,
    ) -> Result<EventAttendanceSummary, AttendanceError> {
        let user = load_user(self.store.as_ref(), user_id)?;
        load_event(self.store.as_ref(), event_id)?;
        access::require(context, Operation::ManageExemption, &AccessTarget::user(&user))?;

        let summary = self
            .store
            .set_skip(user_id, event_id, skip, &self.aggregator)
            .map_err(|err| match err {
                RepositoryError::NotFound => NotFound::Event(event_id.clone()).into(),
                other => AttendanceError::from(other),
            })?;
        info!(
            user = %user_id,
            event = %event_id,
            skip,
            by = %context.actual().id,
            "exemption updated"
        );
        Ok(summary)
    }

    /// Attendance rows and standing of `user_id` for `event_id`.
    pub fn event_standing(
        &self,
        context: &ActorContext,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<EventStanding, AttendanceError> {
        let user = load_user(self.store.as_ref(), user_id)?;
        let event = load_event(self.store.as_ref(), event_id)?;
        access::require(context, Operation::ViewAttendance, &AccessTarget::user(&user))?;

        let rows = self.store.event_attendance(user_id, event_id)?;
        let summary = match self.store.summary(user_id, event_id)? {
            Some(summary) => summary,
            None => self.aggregator.summarize(user_id, &event, &rows, false),
        };

        Ok(EventStanding {
            meets_pass_mark: summary.cumulative >= f64::from(event.pass_mark),
            pass_mark: event.pass_mark,
            attendance: rows.into_iter().map(|row| row.attendance).collect(),
            summary,
        })
    }

    pub fn window_status(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<WindowStatus, AttendanceError> {
        let session = load_session(self.store.as_ref(), session_id)?;
        Ok(self.window.status(session.window.start(), now))
    }

    pub fn is_window_open(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<bool, AttendanceError> {
        let session = load_session(self.store.as_ref(), session_id)?;
        Ok(self.window.is_open(session.window.start(), now))
    }

    fn ensure_not_skipped(&self, user: &User, event: &Event) -> Result<(), AttendanceError> {
        let is_skipped = self
            .store
            .summary(&user.id, &event.id)?
            .map(|summary| summary.skip)
            .unwrap_or(false);
        if is_skipped {
            return Err(skipped(user, event));
        }
        Ok(())
    }

    fn conflict(
        &self,
        context: &ActorContext,
        user: &User,
        session_id: &SessionId,
    ) -> AttendanceError {
        let target = AccessTarget::user(user);
        let edit_allowed =
            access::decide(context.actual(), Operation::EditAttendance, &target).is_allowed();
        warn!(
            user = %user.id,
            session = %session_id,
            edit_allowed,
            "duplicate attendance submission"
        );
        AttendanceError::Conflict {
            user_id: user.id.clone(),
            session_id: session_id.clone(),
            edit_allowed,
        }
    }
}

pub(crate) fn load_user<S: AttendanceStore + ?Sized>(
    store: &S,
    id: &UserId,
) -> Result<User, AttendanceError> {
    store
        .user(id)?
        .ok_or_else(|| NotFound::User(id.clone()).into())
}

pub(crate) fn load_session<S: AttendanceStore + ?Sized>(
    store: &S,
    id: &SessionId,
) -> Result<Session, AttendanceError> {
    store
        .session(id)?
        .ok_or_else(|| NotFound::Session(id.clone()).into())
}

pub(crate) fn load_event<S: AttendanceStore + ?Sized>(
    store: &S,
    id: &EventId,
) -> Result<Event, AttendanceError> {
    store
        .event(id)?
        .ok_or_else(|| NotFound::Event(id.clone()).into())
}

fn validate_arrival(
    arrival_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if arrival_time > now {
        return Err(ValidationError::FutureArrival {
            arrival: arrival_time,
            now,
        });
    }
    Ok(())
}

fn ensure_same_district(user: &User, session: &Session) -> Result<(), ForbiddenError> {
    if user.district_id != session.district_id {
        return Err(ForbiddenError::DistrictMismatch {
            user_id: user.id.clone(),
            session_id: session.id.clone(),
        });
    }
    Ok(())
}

fn skipped(user: &User, event: &Event) -> AttendanceError {
    ForbiddenError::SkippedUser {
        user_id: user.id.clone(),
        event_id: event.id.clone(),
    }
    .into()
}

fn committed_breakdown(
    breakdown: Option<ScoreBreakdown>,
) -> Result<ScoreBreakdown, RepositoryError> {
    breakdown.ok_or_else(|| RepositoryError::Unavailable("commit returned no score".to_string()))
}

fn missing_attendance(user_id: &UserId, session_id: &SessionId) -> AttendanceError {
    NotFound::Attendance {
        user_id: user_id.clone(),
        session_id: session_id.clone(),
    }
    .into()
}
