//! Wizard shift state machine.

use std::sync::Arc;

use crate::error::DatabaseError;
use crate::store::Store;
use crate::tracking::ShiftState;

/// Result of a shift transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOutcome {
    /// The wizard came on-shift with a fresh unassigned row.
    Activated,
    /// The wizard was already on-shift; nothing was mutated.
    AlreadyActive,
    /// The wizard's rows were deleted.
    Deactivated,
}

/// Toggles a wizard between on- and off-shift.
///
/// Invalid shift values are rejected upstream (at payload parsing), so by
/// the time this component runs the state is a well-formed [`ShiftState`].
#[derive(Clone)]
pub struct ShiftManager {
    store: Arc<Store>,
}

impl ShiftManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Apply a shift transition.
    ///
    /// ON replaces the wizard's rows with a single unassigned on-shift
    /// row, unless the wizard is already on-shift (then nothing changes
    /// and [`ShiftOutcome::AlreadyActive`] is returned). OFF deletes the
    /// wizard's rows unconditionally; deleting absent rows is a no-op, so
    /// OFF is absorbing.
    pub async fn set_shift(
        &self,
        wizard_id: &str,
        state: ShiftState,
    ) -> Result<ShiftOutcome, DatabaseError> {
        match state {
            ShiftState::On => {
                if self.store.activate_shift(wizard_id).await? {
                    tracing::info!(wizard_id, "wizard came on-shift");
                    Ok(ShiftOutcome::Activated)
                } else {
                    tracing::debug!(wizard_id, "wizard already on-shift");
                    Ok(ShiftOutcome::AlreadyActive)
                }
            }
            ShiftState::Off => {
                self.store.delete_assignments_by_wizard(wizard_id).await?;
                tracing::info!(wizard_id, "wizard went off-shift");
                Ok(ShiftOutcome::Deactivated)
            }
        }
    }
}
