//! Attendance scoring and aggregation for recurring sessions grouped into events.
//!
//! The [`attendance`] module holds the engine: arrival scoring, the submission window, the
//! weekly-minute checker, the cumulative aggregator, and the role-based access matrix. The
//! remaining modules carry the service plumbing shared with the HTTP binary.

pub mod attendance;
pub mod config;
pub mod error;
pub mod telemetry;
