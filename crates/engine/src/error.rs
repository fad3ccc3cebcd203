/// Errors raised while turning caller input into engine types.
///
/// Conflicting or empty schedules are never errors; they resolve to a
/// verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// A schedule time that is not a zero-padded 24-hour `HH:MM` string.
    #[error("invalid time format '{0}' (expected HH:MM)")]
    InvalidTimeFormat(String),

    /// A holiday or excluded day that is not a `YYYY-MM-DD` calendar date.
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),
}
