//! Cron expression parsing.
//!
//! Accepted forms:
//! - five fields (`min hour dom month dow`), run at second 0;
//! - six fields with a leading seconds field;
//! - descriptors such as `@hourly` or `@daily`;
//! - `@every <duration>` with `h`/`m`/`s` units (`@every 1h30m`).
//!
//! Numeric day-of-week values use the classic numbering where both 0 and 7
//! mean Sunday.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::{Error, Result};

const DAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// A parsed schedule able to compute its next firing time.
#[derive(Clone)]
pub struct CronSchedule {
    expression: String,
    kind: ScheduleKind,
}

#[derive(Clone)]
enum ScheduleKind {
    Cron(Box<cron::Schedule>),
    Every(Duration),
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_cron(expression, "expression is empty"));
        }

        let kind = if let Some(interval) = trimmed.strip_prefix("@every") {
            let interval = parse_interval(interval.trim())
                .ok_or_else(|| Error::invalid_cron(expression, "invalid @every interval"))?;
            ScheduleKind::Every(interval)
        } else {
            let normalized = normalize(trimmed).map_err(|e| Error::invalid_cron(expression, e))?;
            let schedule = cron::Schedule::from_str(&normalized)
                .map_err(|e| Error::invalid_cron(expression, e.to_string()))?;
            ScheduleKind::Cron(Box::new(schedule))
        };

        Ok(Self {
            expression: trimmed.to_string(),
            kind,
        })
    }

    /// The expression as written.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first firing strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Local>) -> Option<DateTime<Local>> {
        match &self.kind {
            ScheduleKind::Cron(schedule) => schedule.after(after).next(),
            ScheduleKind::Every(interval) => {
                let interval = chrono::Duration::from_std(*interval).ok()?;
                after.checked_add_signed(interval)
            }
        }
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

impl FromStr for CronSchedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Rewrite an expression into the six-field form the `cron` crate expects.
fn normalize(expression: &str) -> std::result::Result<String, String> {
    if expression.starts_with('@') {
        return Ok(expression.to_string());
    }

    let mut fields: Vec<String> = expression.split_whitespace().map(str::to_string).collect();
    match fields.len() {
        5 => fields.insert(0, "0".to_string()),
        6 => {}
        n => return Err(format!("expected 5 or 6 fields, found {n}")),
    }

    fields[5] = normalize_day_of_week(&fields[5])?;
    Ok(fields.join(" "))
}

fn normalize_day_of_week(field: &str) -> std::result::Result<String, String> {
    let items = field
        .split(',')
        .map(normalize_day_item)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items.join(","))
}

fn normalize_day_item(item: &str) -> std::result::Result<String, String> {
    if let Some((base, step)) = item.split_once('/') {
        return expand_day_step(base, step);
    }

    match item.split_once('-') {
        Some((start_token, end)) => {
            let start = day_name(start_token)?;
            // `5-7` ends on Sunday, which sorts first in name order.
            if end == "7" {
                return Ok(match (start_token, start.as_str()) {
                    ("7", _) => "SUN".to_string(),
                    (_, "SUN") => "SUN-SAT".to_string(),
                    (_, "SAT") => "SAT,SUN".to_string(),
                    _ => format!("{start}-SAT,SUN"),
                });
            }
            Ok(format!("{start}-{}", day_name(end)?))
        }
        None => day_name(item),
    }
}

/// Expand `base/step` into an explicit day list, since the `cron` crate does
/// not accept steps over named days. A single start day runs through Saturday.
fn expand_day_step(base: &str, step: &str) -> std::result::Result<String, String> {
    let step = step
        .parse::<usize>()
        .ok()
        .filter(|step| *step > 0)
        .ok_or_else(|| format!("invalid day-of-week step '{step}'"))?;

    let (start, end) = match base.split_once('-') {
        _ if base == "*" => (0, 6),
        Some((start, end)) => (day_number(start)?, day_number(end)?),
        None => (day_number(base)?, 6),
    };
    if start > end {
        return Err(format!("day-of-week range '{base}' is inverted"));
    }

    let mut names: Vec<&str> = Vec::new();
    for day in (start..=end).step_by(step) {
        let name = DAY_NAMES[day];
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names.join(","))
}

/// Weekday number (0-7, Sunday is 0 and 7) of a numeric or named token.
fn day_number(token: &str) -> std::result::Result<usize, String> {
    match token.parse::<usize>() {
        Ok(n) if n < DAY_NAMES.len() => Ok(n),
        Ok(n) => Err(format!("day-of-week {n} is out of range 0-7")),
        Err(_) => DAY_NAMES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(token))
            .ok_or_else(|| format!("unknown day-of-week '{token}'")),
    }
}

/// Map a numeric weekday to its name; anything else passes through.
fn day_name(token: &str) -> std::result::Result<String, String> {
    match token.parse::<usize>() {
        Ok(n) => DAY_NAMES
            .get(n)
            .map(|name| name.to_string())
            .ok_or_else(|| format!("day-of-week {n} is out of range 0-7")),
        Err(_) => Ok(token.to_string()),
    }
}

fn parse_interval(input: &str) -> Option<Duration> {
    if input.is_empty() {
        return None;
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits.parse().ok()?;
        digits.clear();
        total += match c {
            'h' => value.checked_mul(3600)?,
            'm' => value.checked_mul(60)?,
            's' => value,
            _ => return None,
        };
    }
    if !digits.is_empty() || total == 0 {
        return None;
    }
    Some(Duration::from_secs(total))
}
