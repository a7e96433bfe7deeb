//! Assignment tracking core.
//!
//! Four stateless components composed around one shared [`Store`]:
//!
//! ```text
//! message event ──► ActivityRecorder ──► AssignmentReconciler (takeover)
//! reassign event ─────────────────────► AssignmentReconciler
//! shift toggle ───► ShiftManager
//! status query ───► LoadMonitor ──► (evict) ──► overload report
//! ```
//!
//! The store exclusively owns persisted state; components never cache it
//! across calls, so they are safe to invoke from concurrent workers.
//!
//! [`Store`]: crate::store::Store

mod activity;
mod assignment;
mod monitor;
mod shift;

pub use activity::ActivityRecorder;
pub use assignment::AssignmentReconciler;
pub use monitor::LoadMonitor;
pub use shift::{ShiftManager, ShiftOutcome};

use chrono::{DateTime, Utc};

/// A wizard's shift state. No intermediate states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftState {
    On,
    Off,
}

impl ShiftState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftState::On => "ON",
            ShiftState::Off => "OFF",
        }
    }
}

impl std::str::FromStr for ShiftState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(ShiftState::On),
            "OFF" => Ok(ShiftState::Off),
            other => Err(format!("invalid shift value '{other}', expected 'ON' or 'OFF'")),
        }
    }
}

impl std::fmt::Display for ShiftState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the assignment table.
///
/// A null `traveler_id` is an on-shift wizard who currently owns no
/// traveler (the initial state after shifting on). A wizard accrues one
/// additional row per traveler acquired; the table enforces uniqueness on
/// `traveler_id` only, never on `wizard_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRow {
    pub wizard_id: String,
    pub traveler_id: Option<String>,
    pub shift: ShiftState,
}

/// The most recent message exchange for a traveler. At most one live
/// entry per `traveler_id`; refreshed on every message, evicted once
/// `occurred_at` falls out of the retention window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub wizard_id: String,
    pub traveler_id: String,
    pub occurred_at: DateTime<Utc>,
}
