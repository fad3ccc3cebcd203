//! Per-entry evaluation, including windows that wrap past midnight.

use time::{Duration, PrimitiveDateTime};

use crate::clock::{at_time_local, subtract_week_day, truncate_to_minute, WeekDay};
use crate::schedule::ScheduleEntry;
use crate::window::{decide, Action};

/// Evaluate one entry at `now` and return the non-hold signals it emits.
///
/// A midnight-crossing entry (e.g. 23:00-05:00) is looked at as two
/// windows: the one that opened yesterday and closes this morning, and the
/// one that opens tonight and closes tomorrow. Each is gated by the weekday
/// bit of the day it opened on; a holiday-active entry ignores the bits.
/// Signals come back in that order, yesterday first.
///
/// A yesterday-window shutdown past this morning's end minute is dropped
/// when today's weekday bit is unset, holiday or not.
pub fn evaluate_entry(
    entry: &ScheduleEntry,
    now: PrimitiveDateTime,
    is_holiday_today: bool,
) -> Vec<Action> {
    let today = WeekDay::of(now);
    let holiday_active = entry.holiday && is_holiday_today;
    let applies_today = holiday_active || entry.days_week.get(today);

    let start = at_time_local(now, entry.start_hour);
    let end = at_time_local(now, entry.end_hour);

    let mut signals = Vec::with_capacity(2);

    if !entry.crosses_midnight() {
        if applies_today {
            signals.push(decide(entry.retain, now, start, end));
        }
        signals.retain(|a| *a != Action::Hold);
        return signals;
    }

    let applies_yesterday = holiday_active || entry.days_week.get(subtract_week_day(today));
    if applies_yesterday {
        let action = decide(entry.retain, now, start - Duration::days(1), end);
        // Past this morning's end minute and today's bit is unset: the
        // shutdown belongs to yesterday's window, which is already over.
        let stale = action == Action::Shutdown
            && truncate_to_minute(now) > end
            && !entry.days_week.get(today);
        if !stale {
            signals.push(action);
        }
    }

    if applies_today {
        signals.push(decide(entry.retain, now, start, end + Duration::days(1)));
    }

    signals.retain(|a| *a != Action::Hold);
    signals
}

// ===========================================================================
// Tests
// ===========================================================================
