//! Schedule entries and the knobs that control how they are combined.

use serde::{Deserialize, Serialize};

use crate::clock::{TimeOfDay, WeekDay};

/// Which weekdays an entry runs on. A fixed seven-field record; unknown
/// keys are rejected, missing ones default to `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaysWeek {
    pub sun: bool,
    pub mon: bool,
    pub tue: bool,
    pub wed: bool,
    pub thu: bool,
    pub fri: bool,
    pub sat: bool,
}

impl DaysWeek {
    pub fn every_day() -> Self {
        Self::from_days(&WeekDay::ALL)
    }

    pub fn from_days(days: &[WeekDay]) -> Self {
        let mut dw = Self::default();
        for day in days {
            *dw.slot(*day) = true;
        }
        dw
    }

    pub fn get(&self, day: WeekDay) -> bool {
        match day {
            WeekDay::Sun => self.sun,
            WeekDay::Mon => self.mon,
            WeekDay::Tue => self.tue,
            WeekDay::Wed => self.wed,
            WeekDay::Thu => self.thu,
            WeekDay::Fri => self.fri,
            WeekDay::Sat => self.sat,
        }
    }

    pub fn is_empty(&self) -> bool {
        !WeekDay::ALL.iter().any(|d| self.get(*d))
    }

    fn slot(&mut self, day: WeekDay) -> &mut bool {
        match day {
            WeekDay::Sun => &mut self.sun,
            WeekDay::Mon => &mut self.mon,
            WeekDay::Tue => &mut self.tue,
            WeekDay::Wed => &mut self.wed,
            WeekDay::Thu => &mut self.thu,
            WeekDay::Fri => &mut self.fri,
            WeekDay::Sat => &mut self.sat,
        }
    }
}

/// One configured on/off interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    #[serde(alias = "startHour")]
    pub start_hour: TimeOfDay,
    #[serde(alias = "endHour")]
    pub end_hour: TimeOfDay,
    #[serde(default, alias = "daysWeek")]
    pub days_week: DaysWeek,
    /// Holiday override: on a holiday this entry applies regardless of
    /// `days_week`; on a normal day it behaves like any other entry.
    #[serde(default)]
    pub holiday: bool,
    /// Level-triggered when set, edge-triggered otherwise.
    #[serde(default)]
    pub retain: bool,
}

impl ScheduleEntry {
    /// `end_hour` earlier in the day than `start_hour`, e.g. 23:00-05:00.
    pub fn crosses_midnight(&self) -> bool {
        self.start_hour > self.end_hour
    }
}

/// The device a schedule set belongs to. Only echoed back in verdicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    #[serde(alias = "deviceName")]
    pub device_name: String,
}

/// How holidays interact with regular entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolidayPolicy {
    /// On a holiday only holiday-flagged entries apply.
    #[default]
    Exclusive,
}

/// Tie-break when one window asks for activation and another for shutdown
/// in the same tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    #[default]
    ActivateWins,
    ShutdownWins,
}

// ===========================================================================
// Tests
// ===========================================================================
