//! Decision engine for on/off automation schedules.
//!
//! Given a device's schedule entries, the holiday and excluded-day lists and
//! the local wall clock, [`process_device`] says whether the device should be
//! activated, shut down, or left alone. It is pure: no I/O, no clock reads,
//! no state between calls.

pub mod aggregate;
pub mod clock;
pub mod engine;
pub mod error;
pub mod midnight;
pub mod schedule;
pub mod select;
pub mod window;

pub use clock::{TimeOfDay, WeekDay};
pub use engine::{process_device, Reason, ScheduleRequest, Verdict};
pub use error::ScheduleError;
pub use schedule::{DaysWeek, Device, HolidayPolicy, Precedence, ScheduleEntry};
pub use window::{decide, Action};
