//! Timestamps as the parking broker serializes them.
//!
//! Depending on the server's JSON settings a single instant arrives as an
//! ISO-8601 string, as (fractional) epoch seconds, or as a date-part array
//! `[year, month, day, hour, minute, second, nanos]`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Values above this are taken as epoch milliseconds rather than seconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// A wire timestamp, kept in its original shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiveTimestamp {
    Text(String),
    Epoch(f64),
    Parts(Vec<i64>),
}

impl LiveTimestamp {
    /// Interpret the value as a UTC instant. Local date-times without an
    /// offset are assumed to be UTC. `None` when the value is not a valid
    /// date.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            LiveTimestamp::Text(raw) => parse_text(raw),
            LiveTimestamp::Epoch(value) => from_epoch(*value),
            LiveTimestamp::Parts(parts) => from_parts(parts),
        }
    }
}

fn parse_text(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let seconds = if value.abs() >= EPOCH_MILLIS_THRESHOLD {
        value / 1000.0
    } else {
        value
    };
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

fn from_parts(parts: &[i64]) -> Option<DateTime<Utc>> {
    let part = |i: usize| parts.get(i).copied().unwrap_or(0);
    if parts.len() < 3 {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(part(0)).ok()?,
        u32::try_from(part(1)).ok()?,
        u32::try_from(part(2)).ok()?,
    )?;
    date.and_hms_nano_opt(
        u32::try_from(part(3)).ok()?,
        u32::try_from(part(4)).ok()?,
        u32::try_from(part(5)).ok()?,
        u32::try_from(part(6)).ok()?,
    )
    .map(|naive| naive.and_utc())
}
