use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use auris_model::{ArchiveSweepLog, PasswordSweepLog};

use crate::error::Result;

/// Audit trail for the two cleanup sweepers.
#[derive(Debug, Clone)]
pub struct CleanupLogRepo {
    pool: SqlitePool,
}

fn row_to_password_log(row: &SqliteRow) -> Result<PasswordSweepLog> {
    let config: String = row.try_get("config_snapshot")?;
    let summary: String = row.try_get("deleted_passwords_summary")?;
    Ok(PasswordSweepLog {
        id: row.try_get("id")?,
        deleted_count: row.try_get("deleted_count")?,
        config_snapshot: serde_json::from_str(&config)?,
        deleted_summary: serde_json::from_str(&summary)?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_archive_log(row: &SqliteRow) -> Result<ArchiveSweepLog> {
    let config: String = row.try_get("config_snapshot")?;
    let summary: String = row.try_get("deleted_archives_summary")?;
    Ok(ArchiveSweepLog {
        id: row.try_get("id")?,
        deleted_count: row.try_get("deleted_count")?,
        freed_bytes: row.try_get("freed_space_bytes")?,
        config_snapshot: serde_json::from_str(&config)?,
        deleted_summary: serde_json::from_str(&summary)?,
        created_at: row.try_get("created_at")?,
    })
}

impl CleanupLogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_password_log(
        &self,
        deleted_count: i64,
        config_snapshot: Value,
        deleted_summary: Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO password_cleanup_logs
                (id, deleted_count, config_snapshot, deleted_passwords_summary,
                 created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(deleted_count)
        .bind(serde_json::to_string(&config_snapshot)?)
        .bind(serde_json::to_string(&deleted_summary)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_archive_log(
        &self,
        deleted_count: i64,
        freed_bytes: i64,
        config_snapshot: Value,
        deleted_summary: Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processed_archive_cleanup_logs
                (id, deleted_count, freed_space_bytes, config_snapshot,
                 deleted_archives_summary, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(deleted_count)
        .bind(freed_bytes)
        .bind(serde_json::to_string(&config_snapshot)?)
        .bind(serde_json::to_string(&deleted_summary)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn password_history(&self, limit: i64) -> Result<Vec<PasswordSweepLog>> {
        let rows = sqlx::query(
            "SELECT * FROM password_cleanup_logs ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_password_log).collect()
    }

    pub async fn archive_history(&self, limit: i64) -> Result<Vec<ArchiveSweepLog>> {
        let rows = sqlx::query(
            "SELECT * FROM processed_archive_cleanup_logs ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_archive_log).collect()
    }
}
