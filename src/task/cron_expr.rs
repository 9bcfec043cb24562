//! Cron expression helpers.
//!
//! Tasks carry classic crontab expressions (`min hour dom mon dow`, with an
//! optional leading seconds field). The `cron` crate wants the seconds field
//! and numbers weekdays from Sunday = 1, so five-field input is pinned to
//! second zero and the day-of-week field is rewritten as day names.

use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use cron::Schedule;

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Expand a crontab expression to the form `cron` expects.
pub fn normalize(expr: &str) -> Result<String, String> {
    let mut fields: Vec<String> = expr.split_whitespace().map(str::to_string).collect();
    if fields.len() == 5 {
        fields.insert(0, "0".to_string());
    }
    if let Some(dow) = fields.get_mut(5) {
        *dow = day_of_week(dow)?;
    }
    Ok(fields.join(" "))
}

/// Rewrite a crontab day-of-week field (0-7, 0 and 7 both Sunday) as a
/// list of day names.
fn day_of_week(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => match step.parse::<u8>() {
                Ok(step) if step > 0 => (range, Some(step)),
                _ => return Err(format!("invalid day-of-week step '{step}'")),
            },
            None => (item, None),
        };
        let (start, end) = if range == "*" {
            (0, 7)
        } else if let Some((a, b)) = range.split_once('-') {
            (day_number(a)?, day_number(b)?)
        } else {
            let day = day_number(range)?;
            (day, if step.is_some() { 7 } else { day })
        };
        if start > end {
            return Err(format!("day-of-week range '{range}' runs backwards"));
        }
        for day in (start..=end).step_by(usize::from(step.unwrap_or(1))) {
            days[usize::from(day % 7)] = true;
        }
    }

    let names: Vec<&str> = DAY_NAMES
        .iter()
        .zip(days)
        .filter_map(|(name, on)| on.then_some(*name))
        .collect();
    Ok(names.join(","))
}

fn day_number(token: &str) -> Result<u8, String> {
    if let Ok(n) = token.parse::<u8>() {
        return if n <= 7 {
            Ok(n)
        } else {
            Err(format!("day-of-week {n} is out of range 0-7"))
        };
    }
    DAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
        .map(|i| i as u8)
        .ok_or_else(|| format!("invalid day-of-week '{token}'"))
}

/// Parse a task schedule.
pub fn parse(expr: &str) -> Result<Schedule, String> {
    if expr.trim().is_empty() {
        return Err("empty cron expression".to_string());
    }
    let normalized = normalize(expr).map_err(|e| format!("invalid cron '{expr}': {e}"))?;
    Schedule::from_str(&normalized).map_err(|e| format!("invalid cron '{expr}': {e}"))
}

pub fn is_valid(expr: &str) -> bool {
    parse(expr).is_ok()
}

/// Next fire time strictly after `after`.
pub fn next_fire<Z: TimeZone>(schedule: &Schedule, after: &DateTime<Z>) -> Option<DateTime<Z>> {
    schedule.after(after).next()
}
