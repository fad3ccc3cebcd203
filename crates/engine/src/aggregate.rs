//! Folds the signals of every selected entry into one action.

use time::PrimitiveDateTime;

use crate::midnight::evaluate_entry;
use crate::schedule::{Precedence, ScheduleEntry};
use crate::window::Action;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate<'a> {
    pub action: Action,
    /// Both an activation and a shutdown were requested this tick.
    pub conflict: bool,
    /// Last entry, in start order, that asked for `action`.
    pub applied: Option<&'a ScheduleEntry>,
}

/// Resolve the OR-ed signals of a tick into one action.
pub fn resolve(any_act: bool, any_shut: bool, precedence: Precedence) -> Action {
    match (any_act, any_shut) {
        (false, false) => Action::Hold,
        (true, false) => Action::Activate,
        (false, true) => Action::Shutdown,
        (true, true) => match precedence {
            Precedence::ActivateWins => Action::Activate,
            Precedence::ShutdownWins => Action::Shutdown,
        },
    }
}

pub fn aggregate<'a>(
    selected: &[&'a ScheduleEntry],
    now: PrimitiveDateTime,
    is_holiday_today: bool,
    precedence: Precedence,
) -> Aggregate<'a> {
    let evaluated: Vec<(&'a ScheduleEntry, Vec<Action>)> = selected
        .iter()
        .map(|entry| (*entry, evaluate_entry(entry, now, is_holiday_today)))
        .collect();

    let fired = |wanted: Action| {
        evaluated
            .iter()
            .any(|(_, signals)| signals.contains(&wanted))
    };
    let any_act = fired(Action::Activate);
    let any_shut = fired(Action::Shutdown);

    let action = resolve(any_act, any_shut, precedence);
    let applied = evaluated
        .iter()
        .rev()
        .find(|(_, signals)| signals.contains(&action))
        .map(|(entry, _)| *entry);

    Aggregate {
        action,
        conflict: any_act && any_shut,
        applied,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
