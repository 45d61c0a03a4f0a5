use super::aggregate::CumulativeAggregator;
use super::domain::{
    Attendance, AttendanceRow, Event, EventAttendanceSummary, EventId, Session, SessionId, User,
    UserId,
};
use super::scoring::ScoreBreakdown;

/// A single attendance write. The store applies it and refreshes the owning summary as one unit.
///
/// Inserts and updates are scored by the store against the session window it holds at commit
/// time; the `percentage_score` carried by the record is replaced.
#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceChange {
    /// Fails with [`RepositoryError::Conflict`] if the (user, session) pair already has a row.
    Insert(Attendance),
    /// Replaces the row for the same (user, session) pair.
    Update(Attendance),
    Delete {
        user_id: UserId,
        session_id: SessionId,
    },
}

/// Result of an applied attendance change.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceCommit {
    /// The row as stored, or the removed row for deletes.
    pub attendance: Attendance,
    /// Score computed under the commit. `None` for deletes.
    pub breakdown: Option<ScoreBreakdown>,
    pub summary: EventAttendanceSummary,
}

/// Schedule edit applied together with the attendance work it triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleCommit<T> {
    pub record: T,
    /// Attendance rows rescored against new session times.
    pub rescored: usize,
    /// Summaries recomputed in the same unit.
    pub refreshed: usize,
}

/// Storage abstraction so the services can be exercised in isolation.
///
/// Implementations must make [`AttendanceStore::commit_attendance`],
/// [`AttendanceStore::refresh_summary`], [`AttendanceStore::set_skip`],
/// [`AttendanceStore::update_event`] and [`AttendanceStore::update_session`] atomic: every summary
/// they write is computed from the complete attendance set visible inside the same unit of work,
/// and exemptions and session times are read inside that unit too.
pub trait AttendanceStore: Send + Sync {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    fn session(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError>;
    fn event(&self, id: &EventId) -> Result<Option<Event>, RepositoryError>;

    fn attendance(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<Option<Attendance>, RepositoryError>;
    fn event_attendance(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Vec<AttendanceRow>, RepositoryError>;
    fn session_attendance(&self, session_id: &SessionId)
        -> Result<Vec<Attendance>, RepositoryError>;
    fn summary(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Option<EventAttendanceSummary>, RepositoryError>;

    fn commit_attendance(
        &self,
        change: AttendanceChange,
        aggregator: &CumulativeAggregator,
    ) -> Result<AttendanceCommit, RepositoryError>;
    fn refresh_summary(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        aggregator: &CumulativeAggregator,
    ) -> Result<EventAttendanceSummary, RepositoryError>;
    fn set_skip(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        skip: bool,
        aggregator: &CumulativeAggregator,
    ) -> Result<EventAttendanceSummary, RepositoryError>;

    fn insert_user(&self, user: User) -> Result<User, RepositoryError>;
    fn insert_event(&self, event: Event) -> Result<Event, RepositoryError>;
    /// Replaces the event and recomputes every summary it owns.
    fn update_event(
        &self,
        event: Event,
        aggregator: &CumulativeAggregator,
    ) -> Result<ScheduleCommit<Event>, RepositoryError>;
    /// Removes the event with its sessions and summaries. Fails with
    /// [`RepositoryError::InUse`] while any attendance references it.
    fn delete_event(&self, id: &EventId) -> Result<Event, RepositoryError>;
    fn insert_session(&self, session: Session) -> Result<Session, RepositoryError>;
    /// Replaces the session. New times rescore every row of the session and refresh the affected
    /// summaries. Fails with [`RepositoryError::InUse`] when anything other than the times changes
    /// on a session that has attendance.
    fn update_session(
        &self,
        session: Session,
        aggregator: &CumulativeAggregator,
    ) -> Result<ScheduleCommit<Session>, RepositoryError>;
    /// Fails with [`RepositoryError::InUse`] while any attendance references it.
    fn delete_session(&self, id: &SessionId) -> Result<Session, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record is referenced by {count} attendance row(s)")]
    InUse { count: usize },
    #[error("user is exempt from this event")]
    Exempt,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
