//! Overload computation.

use std::sync::Arc;

use chrono::Utc;

use crate::error::DatabaseError;
use crate::store::Store;
use crate::tracking::ActivityRecorder;

/// Composes over the assignment table and the activity log: finds
/// on-shift wizards exceeding the load threshold, then cross-references
/// the activity log to report which travelers they are actively serving.
///
/// Read-heavy and safe to run repeatedly; the only side effect is the
/// lazy eviction pass it triggers first.
#[derive(Clone)]
pub struct LoadMonitor {
    store: Arc<Store>,
    recorder: ActivityRecorder,
    threshold: i64,
}

impl LoadMonitor {
    pub fn new(store: Arc<Store>, recorder: ActivityRecorder, threshold: i64) -> Self {
        Self {
            store,
            recorder,
            threshold,
        }
    }

    /// Travelers currently being served by overloaded wizards. An empty
    /// result means no wizard is over the threshold.
    ///
    /// A wizard owning exactly `threshold` travelers is not overloaded;
    /// the count must be strictly greater.
    pub async fn compute_overload(&self) -> Result<Vec<String>, DatabaseError> {
        self.recorder.evict_expired(Utc::now()).await?;

        let wizards = self.store.overloaded_wizards(self.threshold).await?;
        if wizards.is_empty() {
            return Ok(Vec::new());
        }
        tracing::warn!(?wizards, "wizards over load threshold");

        self.store.travelers_active_with(&wizards).await
    }
}
