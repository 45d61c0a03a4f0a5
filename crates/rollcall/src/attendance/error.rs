use chrono::{DateTime, Utc};

use super::access::Operation;
use super::domain::{EventId, SessionId, UserId};
use super::repository::RepositoryError;

/// Bad input. Raised before any write.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("arrival time {arrival} is after the submission time {now}")]
    FutureArrival {
        arrival: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    #[error("session must end after it starts (start {start}, end {end})")]
    InvalidSessionWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("event must end on or after it starts (start {start}, end {end})")]
    InvalidEventRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("pass mark must be between 0 and 100, got {0}")]
    PassMarkOutOfRange(u8),
    #[error("weekly constraint requires a positive minimum number of minutes")]
    MissingWeeklyMinimum,
    #[error("session district {session_district} is outside event {event_id}")]
    SessionOutsideEventDistrict {
        event_id: EventId,
        session_district: String,
    },
    #[error("{resource} still has {count} attendance record(s) and cannot be deleted")]
    HasAttendance { resource: String, count: usize },
    #[error("session {session_id} has {count} attendance record(s); only its times may change")]
    SessionLocked { session_id: SessionId, count: usize },
}

/// Caller is not allowed to perform the request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForbiddenError {
    #[error("{role} may not {operation}")]
    AccessDenied {
        operation: Operation,
        role: &'static str,
    },
    #[error("submission window for session {session_id} is closed")]
    SubmissionWindowClosed { session_id: SessionId },
    #[error("event {event_id} is not accepting attendance at this time")]
    EventClosed { event_id: EventId },
    #[error("user {user_id} is exempt from event {event_id}")]
    SkippedUser { user_id: UserId, event_id: EventId },
    #[error("only administrators may act on behalf of another user")]
    ImpersonationNotPermitted,
    #[error("session {session_id} belongs to a different district than user {user_id}")]
    DistrictMismatch {
        user_id: UserId,
        session_id: SessionId,
    },
}

/// Resource kinds for lookups that came back empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFound {
    #[error("user {0} not found")]
    User(UserId),
    #[error("session {0} not found")]
    Session(SessionId),
    #[error("event {0} not found")]
    Event(EventId),
    #[error("no attendance for user {user_id} in session {session_id}")]
    Attendance {
        user_id: UserId,
        session_id: SessionId,
    },
}

/// Error raised by the attendance and schedule services.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Forbidden(#[from] ForbiddenError),
    #[error("attendance already recorded for user {user_id} in session {session_id}")]
    Conflict {
        user_id: UserId,
        session_id: SessionId,
        /// Whether the actual actor may take the edit path instead.
        edit_allowed: bool,
    },
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl AttendanceError {
    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::Validation(_) => "validation_failed",
            AttendanceError::Forbidden(ForbiddenError::SubmissionWindowClosed { .. }) => {
                "submission_window_closed"
            }
            AttendanceError::Forbidden(ForbiddenError::EventClosed { .. }) => "event_closed",
            AttendanceError::Forbidden(ForbiddenError::SkippedUser { .. }) => "user_exempt",
            AttendanceError::Forbidden(_) => "forbidden",
            AttendanceError::Conflict { .. } => "attendance_exists",
            AttendanceError::NotFound(_) => "not_found",
            AttendanceError::Repository(_) => "repository_unavailable",
        }
    }
}
