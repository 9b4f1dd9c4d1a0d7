use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::info;
use uuid::Uuid;

use auris_model::{ArchivedSource, ArchivedSourceStatus, WorkCode};

use crate::error::Result;

/// Bookkeeping for source archives moved into the archived pool.
#[derive(Debug, Clone)]
pub struct ArchivedSourceRepo {
    pool: SqlitePool,
}

fn row_to_record(row: &SqliteRow) -> Result<ArchivedSource> {
    let work: Option<String> = row.try_get("rjcode")?;
    let status: String = row.try_get("status")?;

    Ok(ArchivedSource {
        id: row.try_get("id")?,
        original_path: row.try_get("original_path")?,
        current_path: row.try_get("current_path")?,
        filename: row.try_get("filename")?,
        work: work.and_then(|code| WorkCode::parse(&code).ok()),
        file_size: row.try_get("file_size")?,
        processed_at: row.try_get("processed_at")?,
        process_count: row.try_get("process_count")?,
        task_id: row.try_get("task_id")?,
        status: ArchivedSourceStatus::from_str(&status),
    })
}

impl ArchivedSourceRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_filename(&self, filename: &str) -> Result<Option<ArchivedSource>> {
        let row = sqlx::query(
            "SELECT * FROM processed_archives WHERE filename = ? ORDER BY processed_at DESC LIMIT 1",
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    pub async fn find_by_current_path(&self, path: &str) -> Result<Option<ArchivedSource>> {
        let row = sqlx::query("SELECT * FROM processed_archives WHERE current_path = ? LIMIT 1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    /// All rows, oldest processed first. Optionally skips rows currently
    /// being reprocessed (the sweeper must not delete those).
    pub async fn list_oldest_first(
        &self,
        exclude_reprocessing: bool,
    ) -> Result<Vec<ArchivedSource>> {
        let sql = if exclude_reprocessing {
            "SELECT * FROM processed_archives WHERE status != 'reprocessing' ORDER BY processed_at ASC"
        } else {
            "SELECT * FROM processed_archives ORDER BY processed_at ASC"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    pub async fn insert(&self, record: &ArchivedSource) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processed_archives
                (id, original_path, current_path, filename, rjcode, file_size,
                 processed_at, process_count, task_id, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.original_path)
        .bind(&record.current_path)
        .bind(&record.filename)
        .bind(record.work.as_ref().map(WorkCode::as_str))
        .bind(record.file_size)
        .bind(record.processed_at)
        .bind(record.process_count)
        .bind(&record.task_id)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Re-point an existing row after another ingest of the same filename.
    pub async fn record_reingest(
        &self,
        id: &str,
        current_path: &str,
        file_size: i64,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE processed_archives
            SET current_path = ?, file_size = ?, processed_at = ?,
                process_count = process_count + 1, task_id = ?,
                status = 'completed'
            WHERE id = ?
            "#,
        )
        .bind(current_path)
        .bind(file_size)
        .bind(now)
        .bind(task_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bump the process counter without moving anything (re-extraction from
    /// inside the pool).
    pub async fn touch_reprocessed(&self, filename: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE processed_archives
            SET process_count = process_count + 1, processed_at = ?,
                status = 'completed'
            WHERE filename = ?
            "#,
        )
        .bind(now)
        .bind(filename)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_status(&self, filename: &str, status: ArchivedSourceStatus) -> Result<()> {
        sqlx::query("UPDATE processed_archives SET status = ? WHERE filename = ?")
            .bind(status.as_str())
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Sweep victims in a single transaction; returns rows actually removed.
    pub async fn delete_rows(&self, ids: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM processed_archives WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    /// Reconcile the table against the files actually present in the pool.
    ///
    /// Present files are upserted (path and size refreshed, `processed_at`
    /// untouched); rows without a backing file are dropped; duplicate rows
    /// per filename collapse to the most recent.
    pub async fn reconcile(&self, present: &[(String, String, i64)]) -> Result<()> {
        let rows = sqlx::query("SELECT * FROM processed_archives ORDER BY processed_at DESC")
            .fetch_all(&self.pool)
            .await?;
        let records: Vec<ArchivedSource> =
            rows.iter().map(row_to_record).collect::<Result<_>>()?;

        let mut tx = self.pool.begin().await?;

        // Most-recent row survives per filename; the rest go.
        let mut kept: Vec<&ArchivedSource> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for record in &records {
            if seen.insert(record.filename.clone()) {
                kept.push(record);
            } else {
                sqlx::query("DELETE FROM processed_archives WHERE id = ?")
                    .bind(&record.id)
                    .execute(&mut *tx)
                    .await?;
                info!(filename = %record.filename, "collapsed duplicate archive row");
            }
        }

        let on_disk: std::collections::HashMap<&str, (&str, i64)> = present
            .iter()
            .map(|(filename, path, size)| (filename.as_str(), (path.as_str(), *size)))
            .collect();

        for record in kept {
            match on_disk.get(record.filename.as_str()) {
                Some((path, size)) => {
                    sqlx::query(
                        "UPDATE processed_archives SET current_path = ?, file_size = ? WHERE id = ?",
                    )
                    .bind(path)
                    .bind(size)
                    .bind(&record.id)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query("DELETE FROM processed_archives WHERE id = ?")
                        .bind(&record.id)
                        .execute(&mut *tx)
                        .await?;
                    info!(filename = %record.filename, "dropped archive row without backing file");
                }
            }
        }

        let known: std::collections::HashSet<&str> =
            records.iter().map(|r| r.filename.as_str()).collect();
        for (filename, path, size) in present {
            if known.contains(filename.as_str()) {
                continue;
            }
            let now = Utc::now();
            sqlx::query(
                r#"
                INSERT INTO processed_archives
                    (id, original_path, current_path, filename, rjcode,
                     file_size, processed_at, process_count, task_id, status)
                VALUES (?, ?, ?, ?, ?, ?, ?, 1, NULL, 'completed')
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(path)
            .bind(path)
            .bind(filename)
            .bind(
                WorkCode::find_in(filename)
                    .map(|code| code.as_str().to_string()),
            )
            .bind(size)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            info!(filename = %filename, "registered unrecorded archived source");
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn record(filename: &str, size: i64) -> ArchivedSource {
        ArchivedSource {
            id: Uuid::new_v4().to_string(),
            original_path: format!("/input/{filename}"),
            current_path: format!("/processed/{filename}"),
            filename: filename.to_string(),
            work: WorkCode::find_in(filename),
            file_size: size,
            processed_at: Utc::now(),
            process_count: 1,
            task_id: None,
            status: ArchivedSourceStatus::Completed,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.archived();

        repo.insert(&record("RJ123456.zip", 1024)).await.unwrap();
        let found = repo.find_by_filename("RJ123456.zip").await.unwrap().unwrap();
        assert_eq!(found.work.unwrap().as_str(), "RJ123456");
        assert_eq!(found.process_count, 1);
    }

    #[tokio::test]
    async fn test_touch_reprocessed() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.archived();

        repo.insert(&record("RJ123456.zip", 1024)).await.unwrap();
        assert!(
            repo.touch_reprocessed("RJ123456.zip", Utc::now())
                .await
                .unwrap()
        );
        assert!(!repo.touch_reprocessed("missing.zip", Utc::now()).await.unwrap());

        let found = repo.find_by_filename("RJ123456.zip").await.unwrap().unwrap();
        assert_eq!(found.process_count, 2);
    }

    #[tokio::test]
    async fn test_reconcile() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.archived();

        // One row with a backing file, one orphan row, one file without a row.
        repo.insert(&record("keep.zip", 10)).await.unwrap();
        repo.insert(&record("orphan.zip", 10)).await.unwrap();

        let present = vec![
            ("keep.zip".to_string(), "/pool/keep.zip".to_string(), 99i64),
            ("new.zip".to_string(), "/pool/new.zip".to_string(), 5i64),
        ];
        repo.reconcile(&present).await.unwrap();

        let kept = repo.find_by_filename("keep.zip").await.unwrap().unwrap();
        assert_eq!(kept.current_path, "/pool/keep.zip");
        assert_eq!(kept.file_size, 99);
        assert!(repo.find_by_filename("orphan.zip").await.unwrap().is_none());
        assert!(repo.find_by_filename("new.zip").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_excludes_reprocessing() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.archived();

        repo.insert(&record("a.zip", 10)).await.unwrap();
        repo.insert(&record("b.zip", 10)).await.unwrap();
        repo.set_status("b.zip", ArchivedSourceStatus::Reprocessing)
            .await
            .unwrap();

        let all = repo.list_oldest_first(false).await.unwrap();
        assert_eq!(all.len(), 2);
        let active = repo.list_oldest_first(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].filename, "a.zip");
    }
}
