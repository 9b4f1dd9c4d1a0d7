use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::debug;
use uuid::Uuid;

use auris_model::{PasswordEntry, PasswordSource, WorkCode};

use crate::error::Result;

/// Extraction password vault.
#[derive(Debug, Clone)]
pub struct PasswordRepo {
    pool: SqlitePool,
}

fn row_to_entry(row: &SqliteRow) -> Result<PasswordEntry> {
    let work: Option<String> = row.try_get("rjcode")?;
    let source: String = row.try_get("source")?;

    Ok(PasswordEntry {
        id: row.try_get("id")?,
        work: work.and_then(|code| WorkCode::parse(&code).ok()),
        filename: row.try_get("filename")?,
        password: row.try_get("password")?,
        description: row.try_get("description")?,
        source: PasswordSource::from_str(&source),
        use_count: row.try_get("use_count")?,
        last_used_at: row.try_get("last_used_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PasswordRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        work: Option<&WorkCode>,
        filename: Option<&str>,
        password: &str,
        description: Option<&str>,
        source: PasswordSource,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO password_entries
                (id, rjcode, filename, password, description, source,
                 use_count, last_used_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, NULL, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(work.map(WorkCode::as_str))
        .bind(filename)
        .bind(password)
        .bind(description)
        .bind(source.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn for_work(&self, work: &WorkCode) -> Result<Vec<PasswordEntry>> {
        let rows = sqlx::query("SELECT * FROM password_entries WHERE rjcode = ?")
            .bind(work.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_entry).collect()
    }

    pub async fn for_filename(&self, filename: &str) -> Result<Vec<PasswordEntry>> {
        let rows = sqlx::query("SELECT * FROM password_entries WHERE filename = ?")
            .bind(filename)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_entry).collect()
    }

    /// Entries bound to neither a work nor a filename.
    pub async fn generic(&self) -> Result<Vec<PasswordEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM password_entries WHERE rjcode IS NULL AND filename IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_entry).collect()
    }

    /// Bump the use counter of every entry carrying this password.
    pub async fn record_use(&self, password: &str, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE password_entries
            SET use_count = use_count + 1, last_used_at = ?, updated_at = ?
            WHERE password = ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(password)
        .execute(&self.pool)
        .await?;
        debug!(rows = result.rows_affected(), "recorded password use");
        Ok(())
    }

    /// Entries eligible for the vault sweep.
    pub async fn sweep_candidates(
        &self,
        max_use_count: i64,
        cutoff: DateTime<Utc>,
        exclude_sources: &[String],
    ) -> Result<Vec<PasswordEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM password_entries WHERE use_count <= ? AND created_at <= ?",
        )
        .bind(max_use_count)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut entries: Vec<PasswordEntry> =
            rows.iter().map(row_to_entry).collect::<Result<_>>()?;
        entries.retain(|entry| !exclude_sources.iter().any(|s| s == entry.source.as_str()));
        Ok(entries)
    }

    /// Sweep victims in a single transaction; returns rows removed.
    pub async fn delete_rows(&self, ids: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM password_entries WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }
}
