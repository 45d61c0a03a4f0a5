use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use super::aggregate::CumulativeAggregator;
use super::domain::{
    Attendance, AttendanceRow, Event, EventAttendanceSummary, EventId, Session, SessionId, User,
    UserId,
};
use super::repository::{
    AttendanceChange, AttendanceCommit, AttendanceStore, RepositoryError, ScheduleCommit,
};
use super::scoring::{score_arrival, ScoreBreakdown};

#[derive(Debug, Default)]
struct StoreState {
    users: BTreeMap<UserId, User>,
    events: BTreeMap<EventId, Event>,
    sessions: BTreeMap<SessionId, Session>,
    attendance: BTreeMap<(UserId, SessionId), Attendance>,
    summaries: BTreeMap<(UserId, EventId), EventAttendanceSummary>,
}

impl StoreState {
    fn rows_for(&self, user_id: &UserId, event_id: &EventId) -> Vec<AttendanceRow> {
        self.attendance
            .values()
            .filter(|record| record.user_id == *user_id && record.event_id == *event_id)
            .filter_map(|record| {
                self.sessions.get(&record.session_id).map(|session| AttendanceRow {
                    attendance: record.clone(),
                    session_duration_minutes: session.window.duration_minutes(),
                })
            })
            .collect()
    }

    fn refresh(
        &mut self,
        user_id: &UserId,
        event_id: &EventId,
        aggregator: &CumulativeAggregator,
    ) -> Result<EventAttendanceSummary, RepositoryError> {
        let event = self.events.get(event_id).ok_or(RepositoryError::NotFound)?;
        let key = (user_id.clone(), event_id.clone());
        let skip = self.summaries.get(&key).map(|summary| summary.skip).unwrap_or(false);
        let rows = self.rows_for(user_id, event_id);
        let summary = aggregator.summarize(user_id, event, &rows, skip);
        self.summaries.insert(key, summary.clone());
        Ok(summary)
    }

    fn is_skipped(&self, user_id: &UserId, event_id: &EventId) -> bool {
        self.summaries
            .get(&(user_id.clone(), event_id.clone()))
            .is_some_and(|summary| summary.skip)
    }

    /// Scores `record` against the session as currently stored.
    fn score(
        &self,
        mut record: Attendance,
    ) -> Result<(Attendance, ScoreBreakdown), RepositoryError> {
        let session = self
            .sessions
            .get(&record.session_id)
            .ok_or(RepositoryError::NotFound)?;
        if self.is_skipped(&record.user_id, &session.event_id) {
            return Err(RepositoryError::Exempt);
        }
        let breakdown = score_arrival(record.arrival_time, &session.window);
        record.event_id = session.event_id.clone();
        record.percentage_score = breakdown.percentage_score;
        Ok((record, breakdown))
    }

    fn attendance_count(&self, predicate: impl Fn(&Attendance) -> bool) -> usize {
        self.attendance.values().filter(|record| predicate(record)).count()
    }
}

/// Process-local store. One lock covers every table, so each attendance write and the summary
/// recomputation it triggers happen as a single unit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }
}

impl AttendanceStore for MemoryStore {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state()?.users.get(id).cloned())
    }

    fn session(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        Ok(self.state()?.sessions.get(id).cloned())
    }

    fn event(&self, id: &EventId) -> Result<Option<Event>, RepositoryError> {
        Ok(self.state()?.events.get(id).cloned())
    }

    fn attendance(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<Option<Attendance>, RepositoryError> {
        let key = (user_id.clone(), session_id.clone());
        Ok(self.state()?.attendance.get(&key).cloned())
    }

    fn event_attendance(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Vec<AttendanceRow>, RepositoryError> {
        Ok(self.state()?.rows_for(user_id, event_id))
    }

    fn session_attendance(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<Attendance>, RepositoryError> {
        Ok(self
            .state()?
            .attendance
            .values()
            .filter(|record| record.session_id == *session_id)
            .cloned()
            .collect())
    }

    fn summary(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Option<EventAttendanceSummary>, RepositoryError> {
        let key = (user_id.clone(), event_id.clone());
        Ok(self.state()?.summaries.get(&key).cloned())
    }

    fn commit_attendance(
        &self,
        change: AttendanceChange,
        aggregator: &CumulativeAggregator,
    ) -> Result<AttendanceCommit, RepositoryError> {
        let mut state = self.state()?;

        let (attendance, breakdown) = match change {
            AttendanceChange::Insert(record) => {
                let key = (record.user_id.clone(), record.session_id.clone());
                if state.attendance.contains_key(&key) {
                    return Err(RepositoryError::Conflict);
                }
                let (record, breakdown) = state.score(record)?;
                state.attendance.insert(key, record.clone());
                (record, Some(breakdown))
            }
            AttendanceChange::Update(mut record) => {
                let key = (record.user_id.clone(), record.session_id.clone());
                let existing = state.attendance.get(&key).ok_or(RepositoryError::NotFound)?;
                record.id = existing.id.clone();
                let (record, breakdown) = state.score(record)?;
                state.attendance.insert(key, record.clone());
                (record, Some(breakdown))
            }
            AttendanceChange::Delete {
                user_id,
                session_id,
            } => {
                let removed = state
                    .attendance
                    .remove(&(user_id, session_id))
                    .ok_or(RepositoryError::NotFound)?;
                (removed, None)
            }
        };

        let summary = state.refresh(&attendance.user_id, &attendance.event_id, aggregator)?;
        Ok(AttendanceCommit {
            attendance,
            breakdown,
            summary,
        })
    }

    fn refresh_summary(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        aggregator: &CumulativeAggregator,
    ) -> Result<EventAttendanceSummary, RepositoryError> {
        self.state()?.refresh(user_id, event_id, aggregator)
    }

    fn set_skip(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        skip: bool,
        aggregator: &CumulativeAggregator,
    ) -> Result<EventAttendanceSummary, RepositoryError> {
        let mut state = self.state()?;
        if !state.users.contains_key(user_id) {
            return Err(RepositoryError::NotFound);
        }
        let event = state.events.get(event_id).ok_or(RepositoryError::NotFound)?;
        let key = (user_id.clone(), event_id.clone());
        let placeholder = aggregator.summarize(user_id, event, &[], skip);
        state
            .summaries
            .entry(key)
            .or_insert(placeholder)
            .skip = skip;
        state.refresh(user_id, event_id, aggregator)
    }

    fn insert_user(&self, user: User) -> Result<User, RepositoryError> {
        let mut state = self.state()?;
        if state.users.contains_key(&user.id) {
            return Err(RepositoryError::Conflict);
        }
        state.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    fn insert_event(&self, event: Event) -> Result<Event, RepositoryError> {
        let mut state = self.state()?;
        if state.events.contains_key(&event.id) {
            return Err(RepositoryError::Conflict);
        }
        state.events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    fn update_event(
        &self,
        event: Event,
        aggregator: &CumulativeAggregator,
    ) -> Result<ScheduleCommit<Event>, RepositoryError> {
        let mut state = self.state()?;
        match state.events.get_mut(&event.id) {
            Some(existing) => *existing = event.clone(),
            None => return Err(RepositoryError::NotFound),
        }

        let users: Vec<UserId> = state
            .summaries
            .keys()
            .filter(|(_, event_id)| *event_id == event.id)
            .map(|(user_id, _)| user_id.clone())
            .collect();
        for user_id in &users {
            state.refresh(user_id, &event.id, aggregator)?;
        }

        Ok(ScheduleCommit {
            record: event,
            rescored: 0,
            refreshed: users.len(),
        })
    }

    fn delete_event(&self, id: &EventId) -> Result<Event, RepositoryError> {
        let mut state = self.state()?;
        if !state.events.contains_key(id) {
            return Err(RepositoryError::NotFound);
        }
        let count = state.attendance_count(|record| record.event_id == *id);
        if count > 0 {
            return Err(RepositoryError::InUse { count });
        }
        state.sessions.retain(|_, session| session.event_id != *id);
        state.summaries.retain(|(_, event_id), _| event_id != id);
        state.events.remove(id).ok_or(RepositoryError::NotFound)
    }

    fn insert_session(&self, session: Session) -> Result<Session, RepositoryError> {
        let mut state = self.state()?;
        if !state.events.contains_key(&session.event_id) {
            return Err(RepositoryError::NotFound);
        }
        if state.sessions.contains_key(&session.id) {
            return Err(RepositoryError::Conflict);
        }
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    fn update_session(
        &self,
        session: Session,
        aggregator: &CumulativeAggregator,
    ) -> Result<ScheduleCommit<Session>, RepositoryError> {
        let mut state = self.state()?;
        let current = state
            .sessions
            .get(&session.id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        if !state.events.contains_key(&session.event_id) {
            return Err(RepositoryError::NotFound);
        }

        let records: Vec<Attendance> = state
            .attendance
            .values()
            .filter(|record| record.session_id == session.id)
            .cloned()
            .collect();
        let details_changed = session.title != current.title
            || session.district_id != current.district_id
            || session.event_id != current.event_id;
        if details_changed && !records.is_empty() {
            return Err(RepositoryError::InUse {
                count: records.len(),
            });
        }

        state.sessions.insert(session.id.clone(), session.clone());
        if session.window == current.window {
            return Ok(ScheduleCommit {
                record: session,
                rescored: 0,
                refreshed: 0,
            });
        }

        let rescored = records.len();
        let mut users = BTreeSet::new();
        for mut record in records {
            record.percentage_score =
                score_arrival(record.arrival_time, &session.window).percentage_score;
            users.insert(record.user_id.clone());
            state
                .attendance
                .insert((record.user_id.clone(), record.session_id.clone()), record);
        }
        for user_id in &users {
            state.refresh(user_id, &session.event_id, aggregator)?;
        }

        Ok(ScheduleCommit {
            record: session,
            rescored,
            refreshed: users.len(),
        })
    }

    fn delete_session(&self, id: &SessionId) -> Result<Session, RepositoryError> {
        let mut state = self.state()?;
        if !state.sessions.contains_key(id) {
            return Err(RepositoryError::NotFound);
        }
        let count = state.attendance_count(|record| record.session_id == *id);
        if count > 0 {
            return Err(RepositoryError::InUse { count });
        }
        state.sessions.remove(id).ok_or(RepositoryError::NotFound)
    }
}
