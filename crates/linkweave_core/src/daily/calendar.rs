//! Calendar bridge contract for daily-note context.
//!
//! The engine only relies on `{title, start, end}`; where the events come
//! from is the host's concern.

use chrono::{Local, NaiveDate, TimeZone, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One calendar entry, times in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub title: String,
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    PermissionDenied,
    Unavailable(String),
}

impl Display for CalendarError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "calendar access denied"),
            Self::Unavailable(message) => write!(f, "calendar unavailable: {message}"),
        }
    }
}

impl Error for CalendarError {}

/// Supplier of calendar events for a time range.
pub trait CalendarSource: Send + Sync {
    /// Events overlapping `[start_ms, end_ms)`.
    fn events_between(&self, start_ms: i64, end_ms: i64)
        -> Result<Vec<CalendarEvent>, CalendarError>;
}

/// Local-time bounds of `date` as `[start_ms, end_ms)`.
pub fn day_bounds(date: NaiveDate) -> (i64, i64) {
    let start = local_midnight_ms(date);
    let end = date
        .succ_opt()
        .map(local_midnight_ms)
        .unwrap_or(start + 24 * 60 * 60 * 1000);
    (start, end)
}

/// Fetches the events of `date`, degrading to an empty list on failure.
pub fn events_for_day(source: Option<&dyn CalendarSource>, date: NaiveDate) -> Vec<CalendarEvent> {
    let Some(source) = source else {
        return Vec::new();
    };
    let (start, end) = day_bounds(date);
    match source.events_between(start, end) {
        Ok(mut events) => {
            events.sort_by(|left, right| {
                left.start_time
                    .cmp(&right.start_time)
                    .then_with(|| left.title.cmp(&right.title))
            });
            events
        }
        Err(err) => {
            warn!(
                "event=daily_calendar module=daily status=warn error={}",
                err
            );
            Vec::new()
        }
    }
}

fn local_midnight_ms(date: NaiveDate) -> i64 {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    // DST gaps can skip local midnight; UTC keeps the bounds total.
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|value| value.timestamp_millis())
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight).timestamp_millis())
}
