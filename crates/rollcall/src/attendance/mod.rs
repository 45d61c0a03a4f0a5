//! Attendance engine: arrival scoring, submission windows, cumulative and weekly aggregation,
//! and the role-based access matrix that gates every operation.
//!
//! Services take the current time as an argument so window and event-range decisions stay
//! deterministic under test. The HTTP router passes `Utc::now()`.

pub mod access;
pub mod aggregate;
pub mod domain;
pub mod error;
pub mod memory;
pub mod repository;
pub mod router;
pub mod schedule;
pub mod scoring;
pub mod service;
pub mod weekly;
pub mod window;

#[cfg(test)]
mod tests;

pub use access::{AccessDecision, AccessTarget, ActorContext, Operation, Scope};
pub use aggregate::{CumulativeAggregator, Standing, SKIPPED_CUMULATIVE};
pub use domain::{
    Attendance, AttendanceId, AttendanceRow, DistrictId, DistrictScope, Event,
    EventAttendanceSummary, EventId, EventKind, Role, Session, SessionId, SessionWindow, User,
    UserId, VoicePart,
};
pub use error::{AttendanceError, ForbiddenError, NotFound, ValidationError};
pub use memory::MemoryStore;
pub use repository::{
    AttendanceChange, AttendanceCommit, AttendanceStore, RepositoryError, ScheduleCommit,
};
pub use router::{attendance_router, AttendanceApi, ACTOR_HEADER, ACT_AS_HEADER};
pub use schedule::{
    EventDraft, EventPatch, ScheduleService, SessionDraft, SessionPatch, SessionUpdate,
};
pub use scoring::{max_percentage, score_arrival, ScoreBreakdown};
pub use service::{AttendanceService, EventStanding, SubmissionOutcome};
pub use weekly::{check_weekly, SessionMinutes, WeeklyCheck};
pub use window::{SubmissionWindow, WindowStatus, WINDOW_CLOSED};
