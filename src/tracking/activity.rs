//! Chat activity recording and time-based eviction.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::DatabaseError;
use crate::store::Store;

/// Records message-exchange events and evicts entries older than the
/// retention window. Eviction is opportunistic: it runs before every
/// write and before every load computation, so staleness is bounded by
/// call frequency rather than a background timer.
#[derive(Clone)]
pub struct ActivityRecorder {
    store: Arc<Store>,
    window: Duration,
}

impl ActivityRecorder {
    pub fn new(store: Arc<Store>, window: Duration) -> Self {
        Self { store, window }
    }

    /// Record a message exchange between a wizard and a traveler.
    ///
    /// Evicts expired entries first, then upserts the traveler's entry, so
    /// exactly one live entry exists for the traveler after return. The
    /// caller's `occurred_at` is adopted as-is; an out-of-order timestamp
    /// overwrites a newer one (callers supply the event truth).
    pub async fn record(
        &self,
        wizard_id: &str,
        traveler_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.evict_expired(Utc::now()).await?;
        self.store
            .upsert_activity(traveler_id, wizard_id, occurred_at)
            .await?;
        tracing::debug!(wizard_id, traveler_id, %occurred_at, "recorded chat activity");
        Ok(())
    }

    /// Delete every entry older than `now` minus the retention window.
    /// Idempotent.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        // An out-of-range window saturates, which evicts nothing.
        let window = TimeDelta::from_std(self.window).unwrap_or(TimeDelta::MAX);
        self.store
            .delete_activity_older_than(now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC))
            .await
    }
}
