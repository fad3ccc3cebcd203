//! The single-window decision primitive.

use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::clock::truncate_to_minute;

/// What a window (or the whole engine) wants the device to do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Leave the device as it is.
    Hold,
    Activate,
    Shutdown,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Hold => "hold",
            Action::Activate => "activate",
            Action::Shutdown => "shutdown",
        }
    }
}

/// Decide for one window `[start, end]` that does not cross midnight.
///
/// * `retain = false`: edge-triggered. Fires only in the minute of `start`
///   (activate) or `end` (shutdown); holds otherwise. Missing that minute
///   loses the edge.
/// * `retain = true`: level-triggered. Activate strictly inside the window,
///   shutdown everywhere else, including both boundaries.
pub fn decide(
    retain: bool,
    now: PrimitiveDateTime,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> Action {
    if retain {
        if start < now && now < end {
            Action::Activate
        } else {
            Action::Shutdown
        }
    } else {
        let now = truncate_to_minute(now);
        if now == truncate_to_minute(start) {
            Action::Activate
        } else if now == truncate_to_minute(end) {
            Action::Shutdown
        } else {
            Action::Hold
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
