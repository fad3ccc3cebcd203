//! Picks which entries take part in today's decision.

use crate::schedule::{HolidayPolicy, ScheduleEntry};

/// Entries that apply today, sorted by `start_hour`.
///
/// Returns `None` when today is a holiday and no holiday entry exists,
/// which the caller turns into an all-day shutdown. Weekday bits are not
/// checked here: a midnight-crossing entry may still apply through
/// yesterday's bit, so that is decided per window.
pub fn select_schedules(
    schedules: &[ScheduleEntry],
    is_holiday_today: bool,
    policy: HolidayPolicy,
) -> Option<Vec<&ScheduleEntry>> {
    let mut selected: Vec<&ScheduleEntry> = match policy {
        HolidayPolicy::Exclusive if is_holiday_today => {
            let holiday: Vec<_> = schedules.iter().filter(|s| s.holiday).collect();
            if holiday.is_empty() {
                return None;
            }
            holiday
        }
        HolidayPolicy::Exclusive => schedules.iter().collect(),
    };

    // Stable, so equal start times keep their input order.
    selected.sort_by_key(|s| s.start_hour);
    Some(selected)
}

// ===========================================================================
// Tests
// ===========================================================================
