use serde::Serialize;

use super::domain::{AttendanceRow, Event, EventAttendanceSummary, UserId};
use super::scoring::round2;
use super::weekly::{check_weekly, SessionMinutes, WeeklyCheck};

/// Standing awarded to an exempt user.
pub const SKIPPED_CUMULATIVE: f64 = 100.0;

/// Aggregated standing of one user for one event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Standing {
    pub cumulative: f64,
    pub sessions_counted: usize,
    pub weekly: Option<WeeklyCheck>,
}

/// Rolls per-session scores into an event standing.
#[derive(Debug, Clone, Copy)]
pub struct CumulativeAggregator {
    default_minimum_minutes: u32,
}

impl CumulativeAggregator {
    pub fn new(default_minimum_minutes: u32) -> Self {
        Self {
            default_minimum_minutes,
        }
    }

    pub fn minimum_minutes_for(&self, event: &Event) -> u32 {
        event
            .minimum_minutes_per_week
            .unwrap_or(self.default_minimum_minutes)
    }

    /// `rows` must be the complete attendance set for the (user, event) pair.
    pub fn standing(&self, event: &Event, rows: &[AttendanceRow], skip: bool) -> Standing {
        if skip {
            return Standing {
                cumulative: SKIPPED_CUMULATIVE,
                sessions_counted: 0,
                weekly: None,
            };
        }

        let cumulative = if rows.is_empty() {
            0.0
        } else {
            let total: f64 = rows.iter().map(|row| row.attendance.percentage_score).sum();
            round2(total / rows.len() as f64)
        };

        let weekly = event.weekly_constraint.then(|| {
            let minutes: Vec<SessionMinutes> = rows
                .iter()
                .map(|row| SessionMinutes {
                    session_duration_minutes: row.session_duration_minutes,
                    attendance_percentage: row.attendance.percentage_score,
                })
                .collect();
            check_weekly(&minutes, self.minimum_minutes_for(event))
        });

        Standing {
            cumulative,
            sessions_counted: rows.len(),
            weekly,
        }
    }

    pub fn summarize(
        &self,
        user_id: &UserId,
        event: &Event,
        rows: &[AttendanceRow],
        skip: bool,
    ) -> EventAttendanceSummary {
        let standing = self.standing(event, rows, skip);
        EventAttendanceSummary {
            user_id: user_id.clone(),
            event_id: event.id.clone(),
            cumulative: standing.cumulative,
            skip,
            sessions_counted: standing.sessions_counted,
            weekly: standing.weekly,
        }
    }
}

impl Default for CumulativeAggregator {
    fn default() -> Self {
        Self::new(240)
    }
}
