//! Wall-clock helpers. Everything here works on `PrimitiveDateTime`, i.e. the
//! local wall clock the caller hands in; no timezone conversion happens
//! inside the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, PrimitiveDateTime, Time, Weekday};

use crate::error::ScheduleError;

// ---------------------------------------------------------------------------
// Time of day
// ---------------------------------------------------------------------------

/// Zero-padded 24-hour `HH:MM`.
const HH_MM: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

/// `YYYY-MM-DD`.
const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// A validated `HH:MM` schedule boundary.
///
/// Ordering is chronological, which matches lexicographic ordering of the
/// zero-padded string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(Time);

impl TimeOfDay {
    pub fn hour(&self) -> u8 {
        self.0.hour()
    }

    pub fn minute(&self) -> u8 {
        self.0.minute()
    }

    pub fn as_time(&self) -> Time {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Time::parse(s, HH_MM)
            .map(TimeOfDay)
            .map_err(|_| ScheduleError::InvalidTimeFormat(s.to_string()))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ScheduleError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0.format(HH_MM).map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

// ---------------------------------------------------------------------------
// Weekdays
// ---------------------------------------------------------------------------

/// Short weekday names as used by schedule bitmaps, in the cyclic order
/// `sun, mon, ..., sat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekDay {
    Sun,
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl WeekDay {
    pub const ALL: [WeekDay; 7] = [
        WeekDay::Sun,
        WeekDay::Mon,
        WeekDay::Tue,
        WeekDay::Wed,
        WeekDay::Thu,
        WeekDay::Fri,
        WeekDay::Sat,
    ];

    pub fn of(dt: PrimitiveDateTime) -> Self {
        dt.weekday().into()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WeekDay::Sun => "sun",
            WeekDay::Mon => "mon",
            WeekDay::Tue => "tue",
            WeekDay::Wed => "wed",
            WeekDay::Thu => "thu",
            WeekDay::Fri => "fri",
            WeekDay::Sat => "sat",
        }
    }
}

impl From<Weekday> for WeekDay {
    fn from(w: Weekday) -> Self {
        match w {
            Weekday::Sunday => WeekDay::Sun,
            Weekday::Monday => WeekDay::Mon,
            Weekday::Tuesday => WeekDay::Tue,
            Weekday::Wednesday => WeekDay::Wed,
            Weekday::Thursday => WeekDay::Thu,
            Weekday::Friday => WeekDay::Fri,
            Weekday::Saturday => WeekDay::Sat,
        }
    }
}

impl fmt::Display for WeekDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The weekday immediately before `day`, wrapping `sun` to `sat`.
pub fn subtract_week_day(day: WeekDay) -> WeekDay {
    let idx = WeekDay::ALL
        .iter()
        .position(|d| *d == day)
        .unwrap_or_default();
    WeekDay::ALL[(idx + WeekDay::ALL.len() - 1) % WeekDay::ALL.len()]
}

// ---------------------------------------------------------------------------
// Anchoring
// ---------------------------------------------------------------------------

/// `t` on the same calendar day as `now`, zero seconds.
pub fn at_time_local(now: PrimitiveDateTime, t: TimeOfDay) -> PrimitiveDateTime {
    PrimitiveDateTime::new(now.date(), t.as_time())
}

/// `now` truncated to 00:00:00.000.
pub fn start_of_day_local(now: PrimitiveDateTime) -> PrimitiveDateTime {
    now.date().midnight()
}

/// `now` with seconds and sub-seconds dropped.
pub fn truncate_to_minute(now: PrimitiveDateTime) -> PrimitiveDateTime {
    now - Duration::seconds(now.second() as i64) - Duration::nanoseconds(now.nanosecond() as i64)
}

/// `YYYY-MM-DD` for a local calendar date.
pub fn to_iso_date(date: Date) -> String {
    // Only fails on components a `Date` lacks; `Display` is the same shape.
    date.format(ISO_DATE).unwrap_or_else(|_| date.to_string())
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_iso_date(s: &str) -> Result<Date, ScheduleError> {
    Date::parse(s, ISO_DATE).map_err(|_| ScheduleError::InvalidDate(s.to_string()))
}

// ===========================================================================
// Tests
// ===========================================================================
