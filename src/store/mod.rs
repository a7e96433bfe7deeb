//! Persistence layer.
//!
//! One store front over two interchangeable backends, chosen by the
//! `DATABASE_URL` scheme: Postgres for production, SQLite for development
//! and tests. The store exclusively owns persisted state; the tracking
//! components re-read and re-write it on every call and hold no caches.
//!
//! Every operation runs under the configured timeout. A timed-out
//! operation is a failed operation; retry policy belongs to the caller.

mod postgres;
mod sqlite;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use self::postgres::PostgresStore;
use self::sqlite::SqliteStore;
use crate::config::{DatabaseConfig, DbKind};
use crate::error::DatabaseError;
use crate::tracking::{ActivityEntry, AssignmentRow};

/// Database store (Postgres or SQLite).
pub struct Store {
    backend: Backend,
    op_timeout: Duration,
}

enum Backend {
    Postgres(PostgresStore),
    Sqlite(SqliteStore),
}

impl Store {
    /// Create a new store from config. Backend is chosen by the
    /// `DATABASE_URL` scheme.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let backend = match config.kind() {
            DbKind::Postgres => Backend::Postgres(PostgresStore::new(config).await?),
            DbKind::Sqlite => Backend::Sqlite(SqliteStore::new(config).await?),
        };
        Ok(Self {
            backend,
            op_timeout: config.op_timeout,
        })
    }

    /// Create both tables if they do not exist. Idempotent.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.bounded("run_migrations", async {
            match &self.backend {
                Backend::Postgres(s) => s.run_migrations().await,
                Backend::Sqlite(s) => s.run_migrations().await,
            }
        })
        .await
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, DatabaseError>
    where
        F: Future<Output = Result<T, DatabaseError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(DatabaseError::Timeout {
                op,
                timeout_secs: self.op_timeout.as_secs(),
            }),
        }
    }

    // ==================== Chat activity ====================

    /// Upsert the traveler's activity entry. After return exactly one live
    /// entry exists for `traveler_id`, reflecting the given wizard and
    /// time. The given `occurred_at` is adopted as-is; no ordering check
    /// against the previous entry.
    pub async fn upsert_activity(
        &self,
        traveler_id: &str,
        wizard_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.bounded("upsert_activity", async {
            match &self.backend {
                Backend::Postgres(s) => s.upsert_activity(traveler_id, wizard_id, occurred_at).await,
                Backend::Sqlite(s) => s.upsert_activity(traveler_id, wizard_id, occurred_at).await,
            }
        })
        .await
    }

    /// Delete every activity entry with `occurred_at` before the cutoff.
    pub async fn delete_activity_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.bounded("delete_activity_older_than", async {
            match &self.backend {
                Backend::Postgres(s) => s.delete_activity_older_than(cutoff).await,
                Backend::Sqlite(s) => s.delete_activity_older_than(cutoff).await,
            }
        })
        .await
    }

    /// The traveler's live activity entry, if any.
    pub async fn find_activity_by_traveler(
        &self,
        traveler_id: &str,
    ) -> Result<Option<ActivityEntry>, DatabaseError> {
        self.bounded("find_activity_by_traveler", async {
            match &self.backend {
                Backend::Postgres(s) => s.find_activity_by_traveler(traveler_id).await,
                Backend::Sqlite(s) => s.find_activity_by_traveler(traveler_id).await,
            }
        })
        .await
    }

    /// Traveler ids with a live activity entry against any of the given
    /// wizards, ordered by traveler id.
    pub async fn travelers_active_with(
        &self,
        wizard_ids: &[String],
    ) -> Result<Vec<String>, DatabaseError> {
        self.bounded("travelers_active_with", async {
            match &self.backend {
                Backend::Postgres(s) => s.travelers_active_with(wizard_ids).await,
                Backend::Sqlite(s) => s.travelers_active_with(wizard_ids).await,
            }
        })
        .await
    }

    // ==================== Assignments ====================

    pub async fn find_assignment_by_traveler(
        &self,
        traveler_id: &str,
    ) -> Result<Option<AssignmentRow>, DatabaseError> {
        self.bounded("find_assignment_by_traveler", async {
            match &self.backend {
                Backend::Postgres(s) => s.find_assignment_by_traveler(traveler_id).await,
                Backend::Sqlite(s) => s.find_assignment_by_traveler(traveler_id).await,
            }
        })
        .await
    }

    pub async fn find_assignments_by_wizard(
        &self,
        wizard_id: &str,
    ) -> Result<Vec<AssignmentRow>, DatabaseError> {
        self.bounded("find_assignments_by_wizard", async {
            match &self.backend {
                Backend::Postgres(s) => s.find_assignments_by_wizard(wizard_id).await,
                Backend::Sqlite(s) => s.find_assignments_by_wizard(wizard_id).await,
            }
        })
        .await
    }

    pub async fn insert_assignment(&self, row: &AssignmentRow) -> Result<(), DatabaseError> {
        self.bounded("insert_assignment", async {
            match &self.backend {
                Backend::Postgres(s) => s.insert_assignment(row).await,
                Backend::Sqlite(s) => s.insert_assignment(row).await,
            }
        })
        .await
    }

    pub async fn delete_assignment_by_traveler(
        &self,
        traveler_id: &str,
    ) -> Result<(), DatabaseError> {
        self.bounded("delete_assignment_by_traveler", async {
            match &self.backend {
                Backend::Postgres(s) => s.delete_assignment_by_traveler(traveler_id).await,
                Backend::Sqlite(s) => s.delete_assignment_by_traveler(traveler_id).await,
            }
        })
        .await
    }

    pub async fn delete_assignments_by_wizard(
        &self,
        wizard_id: &str,
    ) -> Result<(), DatabaseError> {
        self.bounded("delete_assignments_by_wizard", async {
            match &self.backend {
                Backend::Postgres(s) => s.delete_assignments_by_wizard(wizard_id).await,
                Backend::Sqlite(s) => s.delete_assignments_by_wizard(wizard_id).await,
            }
        })
        .await
    }

    /// Make `wizard_id` the traveler's sole current wizard, superseding
    /// any prior assignment. The lookup, delete, and insert execute in one
    /// transaction; the UNIQUE constraint on `traveler_id` guarantees that
    /// concurrent calls for the same traveler leave exactly one winning
    /// row (the loser surfaces a store error).
    ///
    /// The inserted row is marked on-shift: an assignment forces the
    /// receiving wizard active.
    pub async fn reassign_traveler(
        &self,
        traveler_id: &str,
        wizard_id: &str,
    ) -> Result<(), DatabaseError> {
        self.bounded("reassign_traveler", async {
            match &self.backend {
                Backend::Postgres(s) => s.reassign_traveler(traveler_id, wizard_id).await,
                Backend::Sqlite(s) => s.reassign_traveler(traveler_id, wizard_id).await,
            }
        })
        .await
    }

    /// Transition the wizard to on-shift. Returns `false` without mutating
    /// anything if the wizard already has an on-shift row; otherwise
    /// replaces the wizard's rows with a single unassigned on-shift row
    /// and returns `true`. Read and write execute in one transaction.
    pub async fn activate_shift(&self, wizard_id: &str) -> Result<bool, DatabaseError> {
        self.bounded("activate_shift", async {
            match &self.backend {
                Backend::Postgres(s) => s.activate_shift(wizard_id).await,
                Backend::Sqlite(s) => s.activate_shift(wizard_id).await,
            }
        })
        .await
    }

    /// On-shift wizards owning strictly more than `threshold` travelers.
    /// The count ignores null-traveler rows.
    pub async fn overloaded_wizards(&self, threshold: i64) -> Result<Vec<String>, DatabaseError> {
        self.bounded("overloaded_wizards", async {
            match &self.backend {
                Backend::Postgres(s) => s.overloaded_wizards(threshold).await,
                Backend::Sqlite(s) => s.overloaded_wizards(threshold).await,
            }
        })
        .await
    }
}
