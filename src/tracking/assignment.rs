//! Assignment reconciliation.

use std::sync::Arc;

use crate::error::DatabaseError;
use crate::store::Store;

/// Establishes a (traveler, wizard) pair as the traveler's sole current
/// assignment, atomically superseding any prior one.
///
/// The same operation serves explicit reassignment (an admin action) and
/// implicit takeover (a wizard messaging a traveler they do not own); the
/// contract is identical either way.
#[derive(Clone)]
pub struct AssignmentReconciler {
    store: Arc<Store>,
}

impl AssignmentReconciler {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Set the traveler's current wizard, regardless of any prior
    /// assignment. After return exactly one assignment row holds this
    /// traveler, owned by `wizard_id` and marked on-shift.
    pub async fn reassign(&self, traveler_id: &str, wizard_id: &str) -> Result<(), DatabaseError> {
        self.store.reassign_traveler(traveler_id, wizard_id).await?;
        tracing::info!(traveler_id, wizard_id, "traveler reassigned");
        Ok(())
    }
}
