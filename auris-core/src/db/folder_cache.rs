use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use auris_model::{FolderScanCacheEntry, WorkCode};

use crate::error::Result;

/// Scan cache for folders in the existing-folders staging area.
#[derive(Debug, Clone)]
pub struct FolderScanCacheRepo {
    pool: SqlitePool,
}

fn row_to_entry(row: &SqliteRow) -> Result<FolderScanCacheEntry> {
    let work: Option<String> = row.try_get("rjcode")?;
    let duplicate_info: Option<String> = row.try_get("duplicate_info")?;

    Ok(FolderScanCacheEntry {
        folder_path: row.try_get("folder_path")?,
        folder_name: row.try_get("folder_name")?,
        work: work.and_then(|code| WorkCode::parse(&code).ok()),
        duplicate_info: duplicate_info
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?,
        file_count: row.try_get("file_count")?,
        folder_size: row.try_get("folder_size")?,
        cached_at: row.try_get("cached_at")?,
        updated_at: row.try_get("updated_at")?,
        needs_refresh: row.try_get::<i64, _>("needs_refresh")? != 0,
    })
}

impl FolderScanCacheRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, folder_path: &str) -> Result<Option<FolderScanCacheEntry>> {
        let row = sqlx::query("SELECT * FROM existing_folder_cache WHERE folder_path = ?")
            .bind(folder_path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_entry).transpose()
    }

    pub async fn upsert(&self, entry: &FolderScanCacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO existing_folder_cache
                (folder_path, folder_name, rjcode, duplicate_info, file_count,
                 folder_size, cached_at, updated_at, needs_refresh)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (folder_path) DO UPDATE SET
                folder_name = excluded.folder_name,
                rjcode = excluded.rjcode,
                duplicate_info = excluded.duplicate_info,
                file_count = excluded.file_count,
                folder_size = excluded.folder_size,
                updated_at = excluded.updated_at,
                needs_refresh = excluded.needs_refresh
            "#,
        )
        .bind(&entry.folder_path)
        .bind(&entry.folder_name)
        .bind(entry.work.as_ref().map(WorkCode::as_str))
        .bind(
            entry
                .duplicate_info
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(entry.file_count)
        .bind(entry.folder_size)
        .bind(entry.cached_at)
        .bind(entry.updated_at)
        .bind(entry.needs_refresh as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flag the entry so the next listing recomputes its duplicate info.
    pub async fn mark_needs_refresh(&self, folder_path: &str) -> Result<()> {
        sqlx::query(
            "UPDATE existing_folder_cache SET needs_refresh = 1, updated_at = ? WHERE folder_path = ?",
        )
        .bind(Utc::now())
        .bind(folder_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, folder_path: &str) -> Result<()> {
        sqlx::query("DELETE FROM existing_folder_cache WHERE folder_path = ?")
            .bind(folder_path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
