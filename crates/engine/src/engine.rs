//! `process_device`: the full decision for one device at one instant.
//!
//! Precedence, highest first:
//!
//! 1. missing device or schedules: hold (`no_data`)
//! 2. today is an excluded day: shutdown (`excluded`)
//! 3. holiday without holiday entries: shutdown (`holiday_no_schedule`)
//! 4. the aggregated schedule signals

use serde::Serialize;
use time::PrimitiveDateTime;
use tracing::debug;

use crate::aggregate::aggregate;
use crate::clock::{to_iso_date, WeekDay};
use crate::schedule::{Device, HolidayPolicy, Precedence, ScheduleEntry};
use crate::select::select_schedules;
use crate::window::Action;

/// Everything the engine looks at for one call. A read-only snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleRequest<'a> {
    pub device: Option<&'a Device>,
    pub schedules: Option<&'a [ScheduleEntry]>,
    /// `YYYY-MM-DD`; forces shutdown all day.
    pub excluded_days: &'a [String],
    /// `YYYY-MM-DD`.
    pub holidays: &'a [String],
    /// Local wall clock.
    pub now: PrimitiveDateTime,
    pub holiday_policy: HolidayPolicy,
    pub precedence: Precedence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    NoData,
    HolidayNoSchedule,
    Excluded,
    /// Every schedule signal agreed (or none fired, for a hold).
    Scheduled,
    /// Activate and shutdown were both requested; precedence decided.
    Conflict,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::NoData => "no_data",
            Reason::HolidayNoSchedule => "holiday_no_schedule",
            Reason::Excluded => "excluded",
            Reason::Scheduled => "scheduled",
            Reason::Conflict => "conflict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub action: Action,
    pub applied_schedule: Option<ScheduleEntry>,
    pub reason: Reason,
    pub is_holiday_today: bool,
    pub curr_week_day: WeekDay,
    pub total_schedules: usize,
}

impl Verdict {
    pub fn should_activate(&self) -> bool {
        self.action == Action::Activate
    }

    pub fn should_shutdown(&self) -> bool {
        self.action == Action::Shutdown
    }
}

pub fn process_device(req: &ScheduleRequest<'_>) -> Verdict {
    let today = to_iso_date(req.now.date());
    let curr_week_day = WeekDay::of(req.now);
    let is_holiday_today = req.holidays.iter().any(|d| *d == today);

    let (Some(device), Some(schedules)) = (req.device, req.schedules) else {
        debug!("no device or schedules supplied; holding");
        return Verdict {
            action: Action::Hold,
            applied_schedule: None,
            reason: Reason::NoData,
            is_holiday_today,
            curr_week_day,
            total_schedules: 0,
        };
    };

    let mut verdict = match select_schedules(schedules, is_holiday_today, req.holiday_policy) {
        None => Verdict {
            action: Action::Shutdown,
            applied_schedule: None,
            reason: Reason::HolidayNoSchedule,
            is_holiday_today,
            curr_week_day,
            total_schedules: 0,
        },
        Some(selected) => {
            let agg = aggregate(&selected, req.now, is_holiday_today, req.precedence);
            Verdict {
                action: agg.action,
                applied_schedule: agg.applied.cloned(),
                reason: if agg.conflict {
                    Reason::Conflict
                } else {
                    Reason::Scheduled
                },
                is_holiday_today,
                curr_week_day,
                total_schedules: selected.len(),
            }
        }
    };

    if req.excluded_days.iter().any(|d| *d == today) {
        verdict.action = Action::Shutdown;
        verdict.applied_schedule = None;
        verdict.reason = Reason::Excluded;
    }

    debug!(
        device = %device.device_id,
        action = verdict.action.as_str(),
        reason = verdict.reason.as_str(),
        holiday = verdict.is_holiday_today,
        schedules = verdict.total_schedules,
        "schedule evaluated"
    );

    verdict
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::DaysWeek;
    use time::macros::datetime;

    // 2024-01-03 is a Wednesday.
    const WED_NOON: PrimitiveDateTime = datetime!(2024-01-03 12:00);
    const WED: &str = "2024-01-03";

    fn device() -> Device {
        Device {
            device_id: "ac-01".into(),
            device_name: "Lobby AC".into(),
        }
    }

    fn entry(start: &str, end: &str, days: &[WeekDay], retain: bool) -> ScheduleEntry {
        ScheduleEntry {
            start_hour: start.parse().unwrap(),
            end_hour: end.parse().unwrap(),
            days_week: DaysWeek::from_days(days),
            holiday: false,
            retain,
        }
    }

    fn request<'a>(
        device: &'a Device,
        schedules: &'a [ScheduleEntry],
        now: PrimitiveDateTime,
    ) -> ScheduleRequest<'a> {
        ScheduleRequest {
            device: Some(device),
            schedules: Some(schedules),
            excluded_days: &[],
            holidays: &[],
            now,
            holiday_policy: HolidayPolicy::Exclusive,
            precedence: Precedence::ActivateWins,
        }
    }

    // -- Missing input -----------------------------------------------------

    #[test]
    fn missing_device_is_no_data() {
        let schedules = vec![entry("08:00", "18:00", &[WeekDay::Wed], true)];
        let dev = device();
        let mut req = request(&dev, &schedules, WED_NOON);
        req.device = None;

        let v = process_device(&req);
        assert_eq!(v.reason, Reason::NoData);
        assert!(!v.should_activate());
        assert!(!v.should_shutdown());
        assert!(v.applied_schedule.is_none());
    }

    #[test]
    fn missing_schedules_is_no_data_even_when_excluded() {
        let dev = device();
        let excluded = vec![WED.to_string()];
        let mut req = request(&dev, &[], WED_NOON);
        req.schedules = None;
        req.excluded_days = &excluded;

        assert_eq!(process_device(&req).reason, Reason::NoData);
    }

    #[test]
    fn empty_schedule_list_holds() {
        let dev = device();
        let v = process_device(&request(&dev, &[], WED_NOON));
        assert_eq!(v.action, Action::Hold);
        assert_eq!(v.reason, Reason::Scheduled);
        assert_eq!(v.total_schedules, 0);
    }

    // -- Plain schedules ---------------------------------------------------

    #[test]
    fn inside_window_activates() {
        let dev = device();
        let schedules = vec![entry("08:00", "18:00", &[WeekDay::Wed], true)];
        let v = process_device(&request(&dev, &schedules, WED_NOON));
        assert!(v.should_activate());
        assert_eq!(v.reason, Reason::Scheduled);
        assert_eq!(v.applied_schedule.as_ref(), Some(&schedules[0]));
        assert_eq!(v.curr_week_day, WeekDay::Wed);
        assert_eq!(v.total_schedules, 1);
        assert!(!v.is_holiday_today);
    }

    #[test]
    fn edge_mode_between_boundaries_holds() {
        let dev = device();
        let schedules = vec![entry("08:00", "18:00", &[WeekDay::Wed], false)];
        let v = process_device(&request(&dev, &schedules, WED_NOON));
        assert_eq!(v.action, Action::Hold);
        assert!(v.applied_schedule.is_none());
    }

    // -- Midnight crossing -------------------------------------------------

    #[test]
    fn overnight_window_scenarios() {
        let dev = device();
        let mon_only = vec![entry("23:00", "05:00", &[WeekDay::Mon], true)];
        let wed_only = vec![entry("23:00", "05:00", &[WeekDay::Wed], true)];

        // 2024-01-01 is a Monday.
        let v = process_device(&request(&dev, &mon_only, datetime!(2024-01-01 23:30)));
        assert!(v.should_activate());

        let v = process_device(&request(&dev, &mon_only, datetime!(2024-01-02 04:30)));
        assert!(v.should_activate());

        let v = process_device(&request(&dev, &wed_only, datetime!(2024-01-02 04:30)));
        assert!(!v.should_activate());
    }

    #[test]
    fn every_night_window_stays_on_after_start() {
        let dev = device();
        let nightly = vec![entry("23:00", "05:00", &WeekDay::ALL, true)];
        let v = process_device(&request(&dev, &nightly, datetime!(2024-01-01 23:30)));
        assert!(v.should_activate());
        assert_eq!(v.reason, Reason::Conflict);
    }

    // -- Holidays ----------------------------------------------------------

    #[test]
    fn holiday_without_holiday_schedule_shuts_down() {
        let dev = device();
        let holidays = vec![WED.to_string()];
        let schedules = vec![
            entry("00:00", "23:59", &WeekDay::ALL, true),
            entry("08:00", "18:00", &[WeekDay::Wed], true),
        ];
        let mut req = request(&dev, &schedules, WED_NOON);
        req.holidays = &holidays;

        let v = process_device(&req);
        assert!(v.should_shutdown());
        assert_eq!(v.reason, Reason::HolidayNoSchedule);
        assert!(v.is_holiday_today);
    }

    #[test]
    fn holiday_schedule_applies_regardless_of_weekday() {
        let dev = device();
        let holidays = vec![WED.to_string()];
        let mut holiday_entry = entry("10:00", "14:00", &[], true);
        holiday_entry.holiday = true;
        let schedules = vec![entry("00:00", "23:59", &WeekDay::ALL, true), holiday_entry];
        let mut req = request(&dev, &schedules, WED_NOON);
        req.holidays = &holidays;

        let v = process_device(&req);
        assert!(v.should_activate());
        assert_eq!(v.total_schedules, 1);
        assert!(v.applied_schedule.unwrap().holiday);
    }

    #[test]
    fn holiday_overnight_entry_is_not_a_conflict_at_night() {
        let dev = device();
        let holidays = vec![WED.to_string()];
        let mut night = entry("23:00", "05:00", &[], true);
        night.holiday = true;
        let schedules = vec![night];
        let mut req = request(&dev, &schedules, datetime!(2024-01-03 23:30));
        req.holidays = &holidays;

        for precedence in [Precedence::ActivateWins, Precedence::ShutdownWins] {
            req.precedence = precedence;
            let v = process_device(&req);
            assert_eq!(v.action, Action::Activate, "{precedence:?}");
            assert_eq!(v.reason, Reason::Scheduled, "{precedence:?}");
        }
    }

    #[test]
    fn holiday_entry_obeys_weekdays_on_normal_days() {
        let dev = device();
        let mut holiday_entry = entry("10:00", "14:00", &[WeekDay::Thu], true);
        holiday_entry.holiday = true;
        let schedules = vec![holiday_entry];

        let v = process_device(&request(&dev, &schedules, WED_NOON));
        assert_eq!(v.action, Action::Hold);
    }

    // -- Excluded days -----------------------------------------------------

    #[test]
    fn excluded_day_forces_shutdown() {
        let dev = device();
        let excluded = vec![WED.to_string()];
        let schedules = vec![entry("08:00", "18:00", &[WeekDay::Wed], true)];
        let mut req = request(&dev, &schedules, WED_NOON);
        req.excluded_days = &excluded;

        let v = process_device(&req);
        assert!(v.should_shutdown());
        assert!(!v.should_activate());
        assert_eq!(v.reason, Reason::Excluded);
        assert!(v.applied_schedule.is_none());
    }

    #[test]
    fn excluded_beats_holiday_no_schedule() {
        let dev = device();
        let days = vec![WED.to_string()];
        let schedules = vec![entry("08:00", "18:00", &[WeekDay::Wed], true)];
        let mut req = request(&dev, &schedules, WED_NOON);
        req.excluded_days = &days;
        req.holidays = &days;

        assert_eq!(process_device(&req).reason, Reason::Excluded);
    }

    #[test]
    fn other_excluded_day_is_ignored() {
        let dev = device();
        let excluded = vec!["2024-01-04".to_string()];
        let schedules = vec![entry("08:00", "18:00", &[WeekDay::Wed], true)];
        let mut req = request(&dev, &schedules, WED_NOON);
        req.excluded_days = &excluded;

        assert!(process_device(&req).should_activate());
    }

    // -- Aggregation -------------------------------------------------------

    #[test]
    fn conflicting_windows_follow_precedence_in_any_input_order() {
        let dev = device();
        let morning = entry("07:00", "11:00", &[WeekDay::Wed], true);
        let afternoon = entry("10:00", "16:00", &[WeekDay::Wed], true);
        let orders = [
            vec![morning.clone(), afternoon.clone()],
            vec![afternoon.clone(), morning.clone()],
        ];

        for schedules in &orders {
            let mut req = request(&dev, schedules, WED_NOON);
            let v = process_device(&req);
            assert!(v.should_activate());
            assert_eq!(v.reason, Reason::Conflict);
            assert_eq!(v.applied_schedule.as_ref(), Some(&afternoon));

            req.precedence = Precedence::ShutdownWins;
            let v = process_device(&req);
            assert!(v.should_shutdown());
            assert_eq!(v.applied_schedule.as_ref(), Some(&morning));
        }
    }

    #[test]
    fn never_both_activate_and_shutdown() {
        let dev = device();
        let schedules = vec![
            entry("07:00", "11:00", &WeekDay::ALL, true),
            entry("10:00", "16:00", &WeekDay::ALL, false),
            entry("22:00", "02:00", &WeekDay::ALL, true),
        ];
        let mut now = datetime!(2024-01-03 00:00);
        while now < datetime!(2024-01-04 00:00) {
            let v = process_device(&request(&dev, &schedules, now));
            assert!(!(v.should_activate() && v.should_shutdown()));
            now += time::Duration::minutes(7);
        }
    }

    #[test]
    fn identical_input_gives_identical_verdict() {
        let dev = device();
        let schedules = vec![
            entry("08:00", "18:00", &[WeekDay::Wed], true),
            entry("23:00", "05:00", &[WeekDay::Tue], false),
        ];
        let req = request(&dev, &schedules, WED_NOON);
        assert_eq!(process_device(&req), process_device(&req));
    }

    #[test]
    fn verdict_serializes_for_logging() {
        let dev = device();
        let schedules = vec![entry("08:00", "18:00", &[WeekDay::Wed], true)];
        let v = process_device(&request(&dev, &schedules, WED_NOON));
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["action"], "activate");
        assert_eq!(json["reason"], "scheduled");
        assert_eq!(json["curr_week_day"], "wed");
        assert_eq!(json["applied_schedule"]["start_hour"], "08:00");
    }
}
