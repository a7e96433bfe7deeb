//! PostgreSQL backend for the store.

use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::NoTls;

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use crate::tracking::{ActivityEntry, AssignmentRow, ShiftState};

/// PostgreSQL-backed store.
pub struct PostgresStore {
    pool: Pool,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chat_activity (
    traveler_id TEXT PRIMARY KEY,
    wizard_id TEXT NOT NULL,
    occurred_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chat_activity_wizard ON chat_activity (wizard_id);
CREATE INDEX IF NOT EXISTS idx_chat_activity_occurred ON chat_activity (occurred_at);

CREATE TABLE IF NOT EXISTS wizard_assignments (
    wizard_id TEXT NOT NULL,
    traveler_id TEXT UNIQUE,
    shift TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_wizard_assignments_wizard ON wizard_assignments (wizard_id);
"#;

impl PostgresStore {
    /// Create a new store and connect to the database.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = Config::new();
        cfg.url = Some(config.url().to_string());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        let _ = pool.get().await?;

        Ok(Self { pool })
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> Result<deadpool_postgres::Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }

    /// Run schema creation (CREATE TABLE IF NOT EXISTS).
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.batch_execute(SCHEMA).await?;
        Ok(())
    }

    // ==================== Chat activity ====================

    pub async fn upsert_activity(
        &self,
        traveler_id: &str,
        wizard_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO chat_activity (traveler_id, wizard_id, occurred_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (traveler_id) DO UPDATE SET
                wizard_id = EXCLUDED.wizard_id,
                occurred_at = EXCLUDED.occurred_at
            "#,
            &[&traveler_id, &wizard_id, &occurred_at],
        )
        .await?;
        Ok(())
    }

    pub async fn delete_activity_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "DELETE FROM chat_activity WHERE occurred_at < $1",
            &[&cutoff],
        )
        .await?;
        Ok(())
    }

    pub async fn find_activity_by_traveler(
        &self,
        traveler_id: &str,
    ) -> Result<Option<ActivityEntry>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT wizard_id, traveler_id, occurred_at FROM chat_activity WHERE traveler_id = $1",
                &[&traveler_id],
            )
            .await?;
        Ok(row.map(|r| ActivityEntry {
            wizard_id: r.get("wizard_id"),
            traveler_id: r.get("traveler_id"),
            occurred_at: r.get("occurred_at"),
        }))
    }

    pub async fn travelers_active_with(
        &self,
        wizard_ids: &[String],
    ) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT traveler_id FROM chat_activity WHERE wizard_id = ANY($1) ORDER BY traveler_id",
                &[&wizard_ids],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get("traveler_id")).collect())
    }

    // ==================== Assignments ====================

    pub async fn find_assignment_by_traveler(
        &self,
        traveler_id: &str,
    ) -> Result<Option<AssignmentRow>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT wizard_id, traveler_id, shift FROM wizard_assignments WHERE traveler_id = $1",
                &[&traveler_id],
            )
            .await?;
        row.map(row_to_assignment).transpose()
    }

    pub async fn find_assignments_by_wizard(
        &self,
        wizard_id: &str,
    ) -> Result<Vec<AssignmentRow>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT wizard_id, traveler_id, shift FROM wizard_assignments WHERE wizard_id = $1",
                &[&wizard_id],
            )
            .await?;
        rows.into_iter().map(row_to_assignment).collect()
    }

    pub async fn insert_assignment(&self, row: &AssignmentRow) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO wizard_assignments (wizard_id, traveler_id, shift) VALUES ($1, $2, $3)",
            &[&row.wizard_id, &row.traveler_id, &row.shift.as_str()],
        )
        .await?;
        Ok(())
    }

    pub async fn delete_assignment_by_traveler(
        &self,
        traveler_id: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "DELETE FROM wizard_assignments WHERE traveler_id = $1",
            &[&traveler_id],
        )
        .await?;
        Ok(())
    }

    pub async fn delete_assignments_by_wizard(
        &self,
        wizard_id: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "DELETE FROM wizard_assignments WHERE wizard_id = $1",
            &[&wizard_id],
        )
        .await?;
        Ok(())
    }

    pub async fn reassign_traveler(
        &self,
        traveler_id: &str,
        wizard_id: &str,
    ) -> Result<(), DatabaseError> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await?;

        let existing = tx
            .query_opt(
                "SELECT 1 FROM wizard_assignments WHERE traveler_id = $1",
                &[&traveler_id],
            )
            .await?;
        if existing.is_some() {
            tx.execute(
                "DELETE FROM wizard_assignments WHERE traveler_id = $1",
                &[&traveler_id],
            )
            .await?;
        }
        tx.execute(
            "INSERT INTO wizard_assignments (wizard_id, traveler_id, shift) VALUES ($1, $2, $3)",
            &[&wizard_id, &traveler_id, &ShiftState::On.as_str()],
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn activate_shift(&self, wizard_id: &str) -> Result<bool, DatabaseError> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await?;

        let shifts = tx
            .query(
                "SELECT DISTINCT shift FROM wizard_assignments WHERE wizard_id = $1",
                &[&wizard_id],
            )
            .await?;
        if shifts
            .iter()
            .any(|r| r.get::<_, String>("shift") == ShiftState::On.as_str())
        {
            // Already active; dropping the transaction rolls back.
            return Ok(false);
        }

        tx.execute(
            "DELETE FROM wizard_assignments WHERE wizard_id = $1",
            &[&wizard_id],
        )
        .await?;
        tx.execute(
            "INSERT INTO wizard_assignments (wizard_id, traveler_id, shift) VALUES ($1, NULL, $2)",
            &[&wizard_id, &ShiftState::On.as_str()],
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn overloaded_wizards(&self, threshold: i64) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT wizard_id FROM wizard_assignments
                WHERE shift = 'ON'
                GROUP BY wizard_id
                HAVING COUNT(traveler_id) > $1
                "#,
                &[&threshold],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get("wizard_id")).collect())
    }
}

fn row_to_assignment(row: tokio_postgres::Row) -> Result<AssignmentRow, DatabaseError> {
    let shift: String = row.get("shift");
    Ok(AssignmentRow {
        wizard_id: row.get("wizard_id"),
        traveler_id: row.get("traveler_id"),
        shift: shift.parse().map_err(DatabaseError::CorruptRow)?,
    })
}
