use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use super::error::ValidationError;
use super::weekly::WeeklyCheck;

/// Identifier wrapper for members and leaders.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier wrapper for scheduled sessions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Identifier wrapper for events grouping sessions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DistrictId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttendanceId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DistrictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Privilege ladder. Variant order is the capability order, so `Ord` compares privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Member,
    PartLeader,
    DistrictLeader,
    Admin,
}

impl Role {
    /// Roles that bypass the per-session window and may take the elevated-edit path.
    pub const fn is_privileged(self) -> bool {
        !matches!(self, Role::Member)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Role::Member => "MEMBER",
            Role::PartLeader => "PART_LEADER",
            Role::DistrictLeader => "DISTRICT_LEADER",
            Role::Admin => "ADMIN",
        }
    }
}

/// Sub-grouping used to scope part leaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoicePart {
    Soprano,
    Alto,
    Tenor,
    Bass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub district_id: DistrictId,
    #[serde(default)]
    pub voice_part: Option<VoicePart>,
}

/// District visibility of an event: one district, or every district.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "district_id", rename_all = "snake_case")]
pub enum DistrictScope {
    District(DistrictId),
    AllDistricts,
}

impl DistrictScope {
    pub fn includes(&self, district: &DistrictId) -> bool {
        match self {
            DistrictScope::District(own) => own == district,
            DistrictScope::AllDistricts => true,
        }
    }

    pub fn district(&self) -> Option<&DistrictId> {
        match self {
            DistrictScope::District(id) => Some(id),
            DistrictScope::AllDistricts => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Rehearsal,
    Sectional,
    Performance,
    Meeting,
}

/// Validated session start/end pair. `end` is always strictly after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "SessionTimes")]
pub struct SessionWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl SessionWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::InvalidSessionWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }
}

/// Wire form of a session window before validation.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SessionTimes {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TryFrom<SessionTimes> for SessionWindow {
    type Error = ValidationError;

    fn try_from(value: SessionTimes) -> Result<Self, Self::Error> {
        SessionWindow::new(value.start_time, value.end_time)
    }
}

impl Serialize for SessionWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SessionWindow", 3)?;
        state.serialize_field("start_time", &self.start)?;
        state.serialize_field("end_time", &self.end)?;
        state.serialize_field("duration_minutes", &self.duration_minutes())?;
        state.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub event_id: EventId,
    pub district_id: DistrictId,
    pub title: Option<String>,
    pub window: SessionWindow,
    pub created_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub kind: EventKind,
    pub scope: DistrictScope,
    pub pass_mark: u8,
    pub weekly_constraint: bool,
    pub minimum_minutes_per_week: Option<u32>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_by: UserId,
}

/// One user's recorded arrival and resulting score for one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attendance {
    pub id: AttendanceId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub event_id: EventId,
    pub arrival_time: DateTime<Utc>,
    pub percentage_score: f64,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
}

/// Attendance joined with the duration of the session it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRow {
    pub attendance: Attendance,
    pub session_duration_minutes: i64,
}

/// Cached standing of one user across all sessions of one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventAttendanceSummary {
    pub user_id: UserId,
    pub event_id: EventId,
    pub cumulative: f64,
    pub skip: bool,
    pub sessions_counted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly: Option<WeeklyCheck>,
}
