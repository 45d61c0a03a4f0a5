use serde::{Deserialize, Serialize};

use super::scoring::round2;

/// Session length paired with the score recorded for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionMinutes {
    pub session_duration_minutes: i64,
    pub attendance_percentage: f64,
}

impl SessionMinutes {
    pub fn minutes_attended(&self) -> f64 {
        (self.attendance_percentage / 100.0) * self.session_duration_minutes as f64
    }
}

/// Outcome of the minimum-minutes check, reported next to the cumulative score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeeklyCheck {
    pub weekly_minutes: f64,
    pub minimum_minutes: u32,
    pub meets_requirement: bool,
}

pub fn check_weekly(records: &[SessionMinutes], minimum_minutes: u32) -> WeeklyCheck {
    let weekly_minutes: f64 = records.iter().map(SessionMinutes::minutes_attended).sum();

    WeeklyCheck {
        weekly_minutes: round2(weekly_minutes),
        minimum_minutes,
        meets_requirement: weekly_minutes >= f64::from(minimum_minutes),
    }
}
