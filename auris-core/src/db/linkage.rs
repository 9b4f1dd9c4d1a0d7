use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use auris_model::{LinkRelation, LinkageEdge, WorkCode};

use crate::error::Result;

/// Cached translation-linkage edges, 24 h TTL.
#[derive(Debug, Clone)]
pub struct LinkageRepo {
    pool: SqlitePool,
}

fn row_to_edge(row: &SqliteRow) -> Result<LinkageEdge> {
    let origin: String = row.try_get("original_rjcode")?;
    let linked: String = row.try_get("linked_rjcode")?;
    let relation: String = row.try_get("work_type")?;

    Ok(LinkageEdge {
        origin: WorkCode::parse(&origin)
            .map_err(|e| crate::error::IngestError::Internal(e.to_string()))?,
        linked: WorkCode::parse(&linked)
            .map_err(|e| crate::error::IngestError::Internal(e.to_string()))?,
        relation: LinkRelation::from_str(&relation),
        lang: row.try_get("lang")?,
        cached_at: row.try_get("cached_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

impl LinkageRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Unexpired edges rooted at `origin`.
    pub async fn edges_from(
        &self,
        origin: &WorkCode,
        now: DateTime<Utc>,
    ) -> Result<Vec<LinkageEdge>> {
        let rows = sqlx::query(
            "SELECT * FROM work_linkages WHERE original_rjcode = ? AND expires_at > ?",
        )
        .bind(origin.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_edge).collect()
    }

    /// Replace the cached edge set for an origin.
    pub async fn replace_edges(&self, origin: &WorkCode, edges: &[LinkageEdge]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM work_linkages WHERE original_rjcode = ?")
            .bind(origin.as_str())
            .execute(&mut *tx)
            .await?;

        for edge in edges {
            sqlx::query(
                r#"
                INSERT INTO work_linkages
                    (original_rjcode, linked_rjcode, work_type, lang,
                     cached_at, expires_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(origin.as_str())
            .bind(edge.linked.as_str())
            .bind(edge.relation.as_str())
            .bind(&edge.lang)
            .bind(edge.cached_at)
            .bind(edge.expires_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
