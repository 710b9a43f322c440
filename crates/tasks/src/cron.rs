//! Cron normalization and fire-time helpers.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{Result, TaskError};

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
/// Settings use standard 5-field cron: `min hour day-of-month month day-of-week`.
pub fn normalize_cron(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Parse a 5- or 6-field expression.
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    Schedule::from_str(&normalize_cron(expression)).map_err(|e| TaskError::InvalidCron {
        expression: expression.to_string(),
        message: e.to_string(),
    })
}

/// First fire time strictly after `after`.
pub fn next_fire(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// The next `count` fire times of `expression` after `from`.
pub fn upcoming(expression: &str, from: DateTime<Utc>, count: usize) -> Result<Vec<DateTime<Utc>>> {
    Ok(parse_schedule(expression)?.after(&from).take(count).collect())
}
