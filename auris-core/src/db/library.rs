use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use auris_model::{LibrarySnapshot, WorkCode};

use crate::error::Result;

/// Library ledger: one row per shelved work.
#[derive(Debug, Clone)]
pub struct LibraryRepo {
    pool: SqlitePool,
}

fn row_to_snapshot(row: &SqliteRow) -> Result<LibrarySnapshot> {
    let code: String = row.try_get("rjcode")?;
    Ok(LibrarySnapshot {
        work: WorkCode::parse(&code)
            .map_err(|e| crate::error::IngestError::Internal(e.to_string()))?,
        folder_path: row.try_get("folder_path")?,
        folder_size: row.try_get("folder_size")?,
        file_count: row.try_get("file_count")?,
        scanned_at: row.try_get("scanned_at")?,
    })
}

impl LibraryRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, work: &WorkCode) -> Result<Option<LibrarySnapshot>> {
        let row = sqlx::query("SELECT * FROM library_snapshot WHERE rjcode = ?")
            .bind(work.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_snapshot).transpose()
    }

    /// Delete-then-insert so there is never more than one row per work.
    pub async fn replace(&self, snapshot: &LibrarySnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM library_snapshot WHERE rjcode = ?")
            .bind(snapshot.work.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO library_snapshot
                (rjcode, folder_path, folder_size, file_count, scanned_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.work.as_str())
        .bind(&snapshot.folder_path)
        .bind(snapshot.folder_size)
        .bind(snapshot.file_count)
        .bind(snapshot.scanned_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Purge a stale row whose folder no longer exists on disk.
    pub async fn delete(&self, work: &WorkCode) -> Result<()> {
        sqlx::query("DELETE FROM library_snapshot WHERE rjcode = ?")
            .bind(work.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::Utc;

    #[tokio::test]
    async fn test_replace_keeps_single_row() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.library();
        let work = WorkCode::parse("RJ123456").unwrap();

        for (path, size) in [("/library/a", 10), ("/library/b", 20)] {
            repo.replace(&LibrarySnapshot {
                work: work.clone(),
                folder_path: path.to_string(),
                folder_size: size,
                file_count: 1,
                scanned_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let snapshot = repo.get(&work).await.unwrap().unwrap();
        assert_eq!(snapshot.folder_path, "/library/b");
        assert_eq!(snapshot.folder_size, 20);
    }

    #[tokio::test]
    async fn test_delete() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.library();
        let work = WorkCode::parse("RJ123456").unwrap();

        repo.replace(&LibrarySnapshot {
            work: work.clone(),
            folder_path: "/library/a".to_string(),
            folder_size: 1,
            file_count: 1,
            scanned_at: Utc::now(),
        })
        .await
        .unwrap();

        repo.delete(&work).await.unwrap();
        assert!(repo.get(&work).await.unwrap().is_none());
    }
}
