use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::domain::{Event, Role, Session};
use super::error::ForbiddenError;

/// Returned by [`SubmissionWindow::minutes_remaining`] once the window has passed.
pub const WINDOW_CLOSED: i64 = -1;

/// Where `now` falls relative to a session's self-service window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WindowStatus {
    NotYetOpen { opens_in_minutes: i64 },
    Open { closes_in_minutes: i64 },
    Closed,
}

impl WindowStatus {
    pub fn is_open(self) -> bool {
        matches!(self, WindowStatus::Open { .. })
    }

    pub fn minutes_remaining(self) -> i64 {
        match self {
            WindowStatus::NotYetOpen { opens_in_minutes } => opens_in_minutes,
            WindowStatus::Open { closes_in_minutes } => closes_in_minutes,
            WindowStatus::Closed => WINDOW_CLOSED,
        }
    }
}

/// Per-session window for self-service submissions, opening at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionWindow {
    length: Duration,
}

impl SubmissionWindow {
    pub fn new(length: Duration) -> Self {
        Self { length }
    }

    pub fn length(&self) -> Duration {
        self.length
    }

    pub fn closes_at(&self, session_start: DateTime<Utc>) -> DateTime<Utc> {
        session_start + self.length
    }

    pub fn is_open(&self, session_start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        session_start <= now && now <= self.closes_at(session_start)
    }

    pub fn status(&self, session_start: DateTime<Utc>, now: DateTime<Utc>) -> WindowStatus {
        if now < session_start {
            WindowStatus::NotYetOpen {
                opens_in_minutes: ceil_minutes(session_start - now),
            }
        } else if now <= self.closes_at(session_start) {
            WindowStatus::Open {
                closes_in_minutes: ceil_minutes(self.closes_at(session_start) - now),
            }
        } else {
            WindowStatus::Closed
        }
    }

    pub fn minutes_remaining(&self, session_start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        self.status(session_start, now).minutes_remaining()
    }
}

impl Default for SubmissionWindow {
    fn default() -> Self {
        Self::new(Duration::days(3))
    }
}

/// Coarser window used for privileged actors: the event's own date range, inclusive.
pub fn event_accepts(event: &Event, now: DateTime<Utc>) -> bool {
    event.starts_at <= now && now <= event.ends_at
}

/// Admit or reject a submission at `now`. Privileged roles are gated by the event range,
/// everyone else by the per-session window. `role` must be the actual actor's role.
pub fn admit(
    window: &SubmissionWindow,
    role: Role,
    session: &Session,
    event: &Event,
    now: DateTime<Utc>,
) -> Result<(), ForbiddenError> {
    if role.is_privileged() {
        if event_accepts(event, now) {
            Ok(())
        } else {
            Err(ForbiddenError::EventClosed {
                event_id: event.id.clone(),
            })
        }
    } else if window.is_open(session.window.start(), now) {
        Ok(())
    } else {
        Err(ForbiddenError::SubmissionWindowClosed {
            session_id: session.id.clone(),
        })
    }
}

fn ceil_minutes(span: Duration) -> i64 {
    let millis = span.num_milliseconds().max(0) as u64;
    millis.div_ceil(60_000) as i64
}
