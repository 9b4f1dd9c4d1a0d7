//! Typed persistence adapters over the embedded SQLite store.
//!
//! One repository per entity; each owns its rows exclusively and other
//! components refer to rows by id. Sessions are short-lived: every
//! operation borrows the pool, runs, and commits.

mod archived;
mod cleanup_logs;
mod conflicts;
mod folder_cache;
mod library;
mod linkage;
mod metadata_cache;
mod passwords;
mod schema;

pub use archived::ArchivedSourceRepo;
pub use cleanup_logs::CleanupLogRepo;
pub use conflicts::ConflictRepo;
pub use folder_cache::FolderScanCacheRepo;
pub use library::LibraryRepo;
pub use linkage::LinkageRepo;
pub use metadata_cache::MetadataCacheRepo;
pub use passwords::PasswordRepo;

use std::path::Path;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::error::Result;

/// Shared handle to the on-disk store plus one repository per entity.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the SQLite file and bootstrap the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        schema::bootstrap(&pool).await?;
        info!(path = %path.display(), "database ready");
        Ok(Self { pool })
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;
        schema::bootstrap(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn metadata(&self) -> MetadataCacheRepo {
        MetadataCacheRepo::new(self.pool.clone())
    }

    pub fn library(&self) -> LibraryRepo {
        LibraryRepo::new(self.pool.clone())
    }

    pub fn conflicts(&self) -> ConflictRepo {
        ConflictRepo::new(self.pool.clone())
    }

    pub fn archived(&self) -> ArchivedSourceRepo {
        ArchivedSourceRepo::new(self.pool.clone())
    }

    pub fn passwords(&self) -> PasswordRepo {
        PasswordRepo::new(self.pool.clone())
    }

    pub fn linkage(&self) -> LinkageRepo {
        LinkageRepo::new(self.pool.clone())
    }

    pub fn folder_cache(&self) -> FolderScanCacheRepo {
        FolderScanCacheRepo::new(self.pool.clone())
    }

    pub fn cleanup_logs(&self) -> CleanupLogRepo {
        CleanupLogRepo::new(self.pool.clone())
    }
}
