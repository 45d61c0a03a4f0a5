//! Arrival scoring.
//!
//! Every started 120-minute block of a session is worth 100 points. Lateness is charged in
//! 5-minute buckets of 5 points each, and any positive lateness costs at least one bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::SessionWindow;

const BLOCK_MILLIS: u64 = 120 * 60 * 1000;
const POINTS_PER_BLOCK: f64 = 100.0;
const DEDUCTION_STEP_MILLIS: u64 = 5 * 60 * 1000;
const POINTS_PER_STEP: f64 = 5.0;

/// Score plus the figures it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub percentage_score: f64,
    pub minutes_late: f64,
    pub max_percentage: f64,
    pub is_on_time: bool,
    pub deduction_percentage: f64,
}

/// Highest score a session of this length can award.
pub fn max_percentage(window: &SessionWindow) -> f64 {
    let millis = window.duration().num_milliseconds().max(0) as u64;
    millis.div_ceil(BLOCK_MILLIS) as f64 * POINTS_PER_BLOCK
}

pub fn score_arrival(arrival: DateTime<Utc>, window: &SessionWindow) -> ScoreBreakdown {
    let max_percentage = max_percentage(window);
    let late_millis = (arrival - window.start()).num_milliseconds();
    let minutes_late = round2(late_millis as f64 / 60_000.0);

    if late_millis <= 0 {
        return ScoreBreakdown {
            percentage_score: max_percentage,
            minutes_late,
            max_percentage,
            is_on_time: true,
            deduction_percentage: 0.0,
        };
    }

    let steps = (late_millis as u64).div_ceil(DEDUCTION_STEP_MILLIS);
    let deduction_percentage = steps as f64 * POINTS_PER_STEP;

    ScoreBreakdown {
        percentage_score: round2((max_percentage - deduction_percentage).max(0.0)),
        minutes_late,
        max_percentage,
        is_on_time: false,
        deduction_percentage,
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
