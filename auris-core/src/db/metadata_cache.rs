use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use auris_model::{AgeCategory, WorkCode, WorkMetadata};

use crate::error::Result;

/// Cache of authoritative catalog records, 30-day TTL.
#[derive(Debug, Clone)]
pub struct MetadataCacheRepo {
    pool: SqlitePool,
}

fn row_to_metadata(row: &SqliteRow) -> Result<WorkMetadata> {
    let code: String = row.try_get("rjcode")?;
    let tags: String = row.try_get("tags")?;
    let cvs: String = row.try_get("cvs")?;
    let age: String = row.try_get("age_category")?;

    Ok(WorkMetadata {
        work: WorkCode::parse(&code)
            .map_err(|e| crate::error::IngestError::Internal(e.to_string()))?,
        work_name: row.try_get("work_name")?,
        maker_id: row.try_get("maker_id")?,
        maker_name: row.try_get("maker_name")?,
        release_date: row.try_get("release_date")?,
        series_id: row.try_get("series_id")?,
        series_name: row.try_get("series_name")?,
        age_category: match age.as_str() {
            "GEN" => AgeCategory::All,
            "R15" => AgeCategory::R15,
            _ => AgeCategory::Adult,
        },
        tags: serde_json::from_str(&tags)?,
        cvs: serde_json::from_str(&cvs)?,
        cover_url: row.try_get("cover_url")?,
        cached_at: row.try_get("cached_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

impl MetadataCacheRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Unexpired cached record, if any.
    pub async fn get_fresh(
        &self,
        work: &WorkCode,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkMetadata>> {
        let row = sqlx::query(
            "SELECT * FROM work_metadata WHERE rjcode = ? AND expires_at > ?",
        )
        .bind(work.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_metadata).transpose()
    }

    /// Replace any cached record for the same work.
    pub async fn put(&self, metadata: &WorkMetadata) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM work_metadata WHERE rjcode = ?")
            .bind(metadata.work.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO work_metadata
                (rjcode, work_name, maker_id, maker_name, release_date,
                 series_id, series_name, age_category, tags, cvs, cover_url,
                 cached_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(metadata.work.as_str())
        .bind(&metadata.work_name)
        .bind(&metadata.maker_id)
        .bind(&metadata.maker_name)
        .bind(&metadata.release_date)
        .bind(&metadata.series_id)
        .bind(&metadata.series_name)
        .bind(metadata.age_category.as_str())
        .bind(serde_json::to_string(&metadata.tags)?)
        .bind(serde_json::to_string(&metadata.cvs)?)
        .bind(&metadata.cover_url)
        .bind(metadata.cached_at)
        .bind(metadata.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Drop the cached record so the next resolution refetches.
    pub async fn invalidate(&self, work: &WorkCode) -> Result<()> {
        sqlx::query("DELETE FROM work_metadata WHERE rjcode = ?")
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
    use chrono::Duration;

    fn sample(code: &str, expires_in_days: i64) -> WorkMetadata {
        let now = Utc::now();
        WorkMetadata {
            work: WorkCode::parse(code).unwrap(),
            work_name: "テスト作品".to_string(),
            maker_id: "RG00001".to_string(),
            maker_name: "maker".to_string(),
            release_date: "2024-03-01".to_string(),
            series_id: None,
            series_name: None,
            age_category: AgeCategory::Adult,
            tags: vec!["tag1".to_string(), "tag2".to_string()],
            cvs: vec!["cv1".to_string()],
            cover_url: "https://img.example/main.jpg".to_string(),
            cached_at: now,
            expires_at: now + Duration::days(expires_in_days),
        }
    }

    #[tokio::test]
    async fn test_put_and_get_fresh() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.metadata();

        let metadata = sample("RJ123456", 30);
        repo.put(&metadata).await.unwrap();

        let fetched = repo
            .get_fresh(&metadata.work, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.work_name, "テスト作品");
        assert_eq!(fetched.tags.len(), 2);
        assert_eq!(fetched.age_category, AgeCategory::Adult);
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.metadata();

        let metadata = sample("RJ123456", -1);
        repo.put(&metadata).await.unwrap();

        assert!(
            repo.get_fresh(&metadata.work, Utc::now())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_invalidate() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.metadata();

        let metadata = sample("RJ123456", 30);
        repo.put(&metadata).await.unwrap();
        repo.invalidate(&metadata.work).await.unwrap();

        assert!(
            repo.get_fresh(&metadata.work, Utc::now())
                .await
                .unwrap()
                .is_none()
        );
    }
}
