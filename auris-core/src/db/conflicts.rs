use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::info;
use uuid::Uuid;

use auris_model::{ConflictKind, ConflictRecord, TaskId, WorkCode};

use crate::error::{IngestError, Result};

/// Quarantine ledger of works waiting on an operator decision.
#[derive(Debug, Clone)]
pub struct ConflictRepo {
    pool: SqlitePool,
}

fn row_to_record(row: &SqliteRow) -> Result<ConflictRecord> {
    let code: String = row.try_get("rjcode")?;
    let kind: String = row.try_get("conflict_type")?;
    let task_id: String = row.try_get("task_id")?;
    let metadata: String = row.try_get("new_metadata")?;
    let linked: String = row.try_get("linked_works_info")?;
    let analysis: String = row.try_get("analysis_info")?;
    let related: String = row.try_get("related_rjcodes")?;

    Ok(ConflictRecord {
        id: row.try_get("id")?,
        task_id: TaskId::parse(&task_id)
            .ok_or_else(|| IngestError::Internal(format!("bad task id: {task_id}")))?,
        work: WorkCode::parse(&code).map_err(|e| IngestError::Internal(e.to_string()))?,
        kind: ConflictKind::from_str(&kind)
            .ok_or_else(|| IngestError::Internal(format!("unknown conflict type: {kind}")))?,
        existing_path: row.try_get("existing_path")?,
        new_path: row.try_get("new_path")?,
        new_metadata: serde_json::from_str(&metadata)?,
        status: row.try_get("status")?,
        linked_works_info: serde_json::from_str(&linked)?,
        analysis_info: serde_json::from_str(&analysis)?,
        related_works: serde_json::from_str(&related)?,
        created_at: row.try_get("created_at")?,
    })
}

impl ConflictRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<ConflictRecord>> {
        let row = sqlx::query("SELECT * FROM conflict_works WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    pub async fn pending_for(&self, work: &WorkCode) -> Result<Option<ConflictRecord>> {
        let row = sqlx::query(
            "SELECT * FROM conflict_works WHERE rjcode = ? AND status = 'PENDING' LIMIT 1",
        )
        .bind(work.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    pub async fn list_pending(&self) -> Result<Vec<ConflictRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM conflict_works WHERE status = 'PENDING' ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    /// Insert a new pending record unless one already exists for the work.
    /// Returns whether a row was written.
    pub async fn insert_pending(
        &self,
        task_id: TaskId,
        work: &WorkCode,
        kind: ConflictKind,
        existing_path: &str,
        new_path: &str,
        new_metadata: serde_json::Value,
        linked_works_info: serde_json::Value,
        analysis_info: serde_json::Value,
        related_works: &[WorkCode],
    ) -> Result<bool> {
        if self.pending_for(work).await?.is_some() {
            info!(work = %work, "pending conflict already recorded, skipping");
            return Ok(false);
        }

        // The operator may have deleted the new side already; a conflict
        // without a new side is unresolvable noise.
        if !new_path.is_empty() && !std::path::Path::new(new_path).exists() {
            info!(work = %work, new_path, "new side vanished, skipping conflict record");
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO conflict_works
                (id, task_id, rjcode, conflict_type, existing_path, new_path,
                 new_metadata, status, linked_works_info, analysis_info,
                 related_rjcodes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'PENDING', ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(task_id.to_string())
        .bind(work.as_str())
        .bind(kind.as_str())
        .bind(existing_path)
        .bind(new_path)
        .bind(serde_json::to_string(&new_metadata)?)
        .bind(serde_json::to_string(&linked_works_info)?)
        .bind(serde_json::to_string(&analysis_info)?)
        .bind(serde_json::to_string(related_works)?)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        info!(work = %work, kind = kind.as_str(), "conflict recorded");
        Ok(true)
    }

    pub async fn set_status(&self, id: &str, status: &str) -> Result<()> {
        let result = sqlx::query("UPDATE conflict_works SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(IngestError::ConflictNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn insert_at(repo: &ConflictRepo, code: &str, new_path: &str) -> bool {
        repo.insert_pending(
            TaskId::new(),
            &WorkCode::parse(code).unwrap(),
            ConflictKind::Duplicate,
            "/library/existing",
            new_path,
            serde_json::json!({}),
            serde_json::json!([]),
            serde_json::json!({}),
            &[],
        )
        .await
        .unwrap()
    }

    async fn insert(repo: &ConflictRepo, code: &str) -> bool {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("conflict-test-{code}.zip"));
        std::fs::write(&path, b"x").unwrap();
        insert_at(repo, code, &path.to_string_lossy()).await
    }

    #[tokio::test]
    async fn test_single_pending_per_work() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.conflicts();

        assert!(insert(&repo, "RJ123456").await);
        assert!(!insert(&repo, "RJ123456").await);

        let pending = repo.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, ConflictKind::Duplicate);
    }

    #[tokio::test]
    async fn test_resolution_reopens_slot() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.conflicts();

        assert!(insert(&repo, "RJ123456").await);
        let record = repo
            .pending_for(&WorkCode::parse("RJ123456").unwrap())
            .await
            .unwrap()
            .unwrap();
        repo.set_status(&record.id, "KEEP_NEW").await.unwrap();

        // A later submission of the same work may quarantine again.
        assert!(insert(&repo, "RJ123456").await);
    }

    #[tokio::test]
    async fn test_set_status_unknown_id() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.conflicts();
        assert!(repo.set_status("missing", "SKIP").await.is_err());
    }

    #[tokio::test]
    async fn test_vanished_new_side_is_skipped() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = db.conflicts();
        assert!(!insert_at(&repo, "RJ654321", "/nowhere/RJ654321.zip").await);
        assert!(repo.list_pending().await.unwrap().is_empty());
    }
}
