//! SQLite backend for the store.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::FromRow;

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use crate::tracking::{ActivityEntry, AssignmentRow, ShiftState};

/// SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Fixed-width UTC timestamp encoding. Lexicographic order matches
/// chronological order, so the eviction cutoff compares correctly as TEXT.
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.naive_utc().format(TS_FORMAT).to_string()
}

fn decode_ts(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map(|n| n.and_utc())
        .map_err(|e| DatabaseError::CorruptRow(format!("bad timestamp '{s}': {e}")))
}

fn sqlite_path_from_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("sqlite://") {
        url.strip_prefix("sqlite://").unwrap_or(url).trim_start_matches('/').to_string()
    } else {
        url.to_string()
    }
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = config.url();
        let path = sqlite_path_from_url(url);
        let path = if path.is_empty() || path == "memory" || path == ":memory:" {
            "file::memory:?cache=shared".to_string()
        } else {
            format!("file:{}?mode=rwc", path)
        };

        let opts = SqliteConnectOptions::from_str(&path)
            .map_err(|e| DatabaseError::Pool(format!("Invalid SQLite path: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts)
            .await
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema creation (CREATE TABLE IF NOT EXISTS).
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let stmts = [
            "CREATE TABLE IF NOT EXISTS chat_activity (
                traveler_id TEXT PRIMARY KEY,
                wizard_id TEXT NOT NULL,
                occurred_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_chat_activity_wizard
                ON chat_activity (wizard_id)",
            "CREATE INDEX IF NOT EXISTS idx_chat_activity_occurred
                ON chat_activity (occurred_at)",
            "CREATE TABLE IF NOT EXISTS wizard_assignments (
                wizard_id TEXT NOT NULL,
                traveler_id TEXT UNIQUE,
                shift TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_wizard_assignments_wizard
                ON wizard_assignments (wizard_id)",
        ];
        for stmt in stmts {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    // ==================== Chat activity ====================

    pub async fn upsert_activity(
        &self,
        traveler_id: &str,
        wizard_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO chat_activity (traveler_id, wizard_id, occurred_at)
             VALUES (?, ?, ?)
             ON CONFLICT (traveler_id) DO UPDATE SET
                 wizard_id = excluded.wizard_id,
                 occurred_at = excluded.occurred_at",
        )
        .bind(traveler_id)
        .bind(wizard_id)
        .bind(encode_ts(occurred_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_activity_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM chat_activity WHERE occurred_at < ?")
            .bind(encode_ts(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_activity_by_traveler(
        &self,
        traveler_id: &str,
    ) -> Result<Option<ActivityEntry>, DatabaseError> {
        let row: Option<ActivityRow> = sqlx::query_as(
            "SELECT wizard_id, traveler_id, occurred_at FROM chat_activity WHERE traveler_id = ?",
        )
        .bind(traveler_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ActivityRow::into_entry).transpose()
    }

    pub async fn travelers_active_with(
        &self,
        wizard_ids: &[String],
    ) -> Result<Vec<String>, DatabaseError> {
        if wizard_ids.is_empty() {
            return Ok(Vec::new());
        }
        // Placeholders only; every id is bound, never interpolated.
        let placeholders = vec!["?"; wizard_ids.len()].join(", ");
        let sql = format!(
            "SELECT traveler_id FROM chat_activity WHERE wizard_id IN ({placeholders}) ORDER BY traveler_id"
        );
        let mut query = sqlx::query_scalar(&sql);
        for id in wizard_ids {
            query = query.bind(id);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    // ==================== Assignments ====================

    pub async fn find_assignment_by_traveler(
        &self,
        traveler_id: &str,
    ) -> Result<Option<AssignmentRow>, DatabaseError> {
        let row: Option<AssignRow> = sqlx::query_as(
            "SELECT wizard_id, traveler_id, shift FROM wizard_assignments WHERE traveler_id = ?",
        )
        .bind(traveler_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AssignRow::into_assignment).transpose()
    }

    pub async fn find_assignments_by_wizard(
        &self,
        wizard_id: &str,
    ) -> Result<Vec<AssignmentRow>, DatabaseError> {
        let rows: Vec<AssignRow> = sqlx::query_as(
            "SELECT wizard_id, traveler_id, shift FROM wizard_assignments WHERE wizard_id = ?",
        )
        .bind(wizard_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AssignRow::into_assignment).collect()
    }

    pub async fn insert_assignment(&self, row: &AssignmentRow) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO wizard_assignments (wizard_id, traveler_id, shift) VALUES (?, ?, ?)")
            .bind(&row.wizard_id)
            .bind(&row.traveler_id)
            .bind(row.shift.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_assignment_by_traveler(
        &self,
        traveler_id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM wizard_assignments WHERE traveler_id = ?")
            .bind(traveler_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_assignments_by_wizard(
        &self,
        wizard_id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM wizard_assignments WHERE wizard_id = ?")
            .bind(wizard_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn reassign_traveler(
        &self,
        traveler_id: &str,
        wizard_id: &str,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM wizard_assignments WHERE traveler_id = ?")
                .bind(traveler_id)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            sqlx::query("DELETE FROM wizard_assignments WHERE traveler_id = ?")
                .bind(traveler_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("INSERT INTO wizard_assignments (wizard_id, traveler_id, shift) VALUES (?, ?, ?)")
            .bind(wizard_id)
            .bind(traveler_id)
            .bind(ShiftState::On.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn activate_shift(&self, wizard_id: &str) -> Result<bool, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let shifts: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT shift FROM wizard_assignments WHERE wizard_id = ?")
                .bind(wizard_id)
                .fetch_all(&mut *tx)
                .await?;
        if shifts.iter().any(|s| s == ShiftState::On.as_str()) {
            // Already active; dropping the transaction rolls back.
            return Ok(false);
        }

        sqlx::query("DELETE FROM wizard_assignments WHERE wizard_id = ?")
            .bind(wizard_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO wizard_assignments (wizard_id, traveler_id, shift) VALUES (?, NULL, ?)")
            .bind(wizard_id)
            .bind(ShiftState::On.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn overloaded_wizards(&self, threshold: i64) -> Result<Vec<String>, DatabaseError> {
        let wizards: Vec<String> = sqlx::query_scalar(
            "SELECT wizard_id FROM wizard_assignments
             WHERE shift = 'ON'
             GROUP BY wizard_id
             HAVING COUNT(traveler_id) > ?",
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(wizards)
    }
}

#[derive(FromRow)]
struct ActivityRow {
    wizard_id: String,
    traveler_id: String,
    occurred_at: String,
}

impl ActivityRow {
    fn into_entry(self) -> Result<ActivityEntry, DatabaseError> {
        Ok(ActivityEntry {
            wizard_id: self.wizard_id,
            traveler_id: self.traveler_id,
            occurred_at: decode_ts(&self.occurred_at)?,
        })
    }
}

#[derive(FromRow)]
struct AssignRow {
    wizard_id: String,
    traveler_id: Option<String>,
    shift: String,
}

impl AssignRow {
    fn into_assignment(self) -> Result<AssignmentRow, DatabaseError> {
        Ok(AssignmentRow {
            wizard_id: self.wizard_id,
            traveler_id: self.traveler_id,
            shift: self.shift.parse().map_err(DatabaseError::CorruptRow)?,
        })
    }
}
