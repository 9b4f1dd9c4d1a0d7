use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use auris_model::{
    ArchivedSourceStatus, ConflictRecord, LibrarySnapshot, ResolutionAction, TaskKind, TaskStatus,
};

use crate::error::{IngestError, Result};
use crate::transform;
use crate::{fsutil, transform::apply_filters};

use super::archival;
use super::engine::TaskEngine;
use super::services::Services;
use super::task::IngestTask;

/// What happens to the source archive after a resolution re-ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceDisposition {
    Archive,
    Delete,
}

/// Applies operator decisions to pending conflict records.
pub struct ConflictResolver {
    services: Arc<Services>,
    engine: Arc<TaskEngine>,
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver").finish_non_exhaustive()
    }
}

impl ConflictResolver {
    pub fn new(services: Arc<Services>, engine: Arc<TaskEngine>) -> Self {
        Self { services, engine }
    }

    /// Apply `action` to the pending conflict `conflict_id`.
    pub async fn resolve(&self, conflict_id: &str, action: ResolutionAction) -> Result<()> {
        let conflict = self
            .services
            .db
            .conflicts()
            .get(conflict_id)
            .await?
            .ok_or_else(|| IngestError::ConflictNotFound(conflict_id.to_string()))?;

        if !conflict.is_pending() {
            return Err(IngestError::Internal(format!(
                "conflict {conflict_id} already resolved as {}",
                conflict.status
            )));
        }

        info!(
            conflict = conflict_id,
            work = %conflict.work,
            action = action.as_str(),
            "applying conflict resolution"
        );

        let message = match action {
            ResolutionAction::KeepNew => {
                self.keep_new(&conflict, true).await?;
                "已保留新版"
            }
            ResolutionAction::KeepBoth => {
                self.keep_new(&conflict, false).await?;
                "已保留两者"
            }
            ResolutionAction::KeepOld => {
                self.discard_new(&conflict).await?;
                "已保留旧版"
            }
            ResolutionAction::Skip => {
                self.discard_new(&conflict).await?;
                "已抛弃新版"
            }
            ResolutionAction::Merge | ResolutionAction::MergeLanguage => {
                self.merge(&conflict).await?;
                "已合并保留"
            }
        };

        self.services
            .db
            .conflicts()
            .set_status(conflict_id, action.as_str())
            .await?;

        // A staged folder that was listed in the staging scan cache no
        // longer reflects reality after any resolution.
        if let Err(err) = self
            .services
            .db
            .folder_cache()
            .mark_needs_refresh(&conflict.new_path)
            .await
        {
            warn!(path = %conflict.new_path, "folder cache refresh flag failed: {err}");
        }

        if let Err(err) = self.engine.update_status(
            conflict.task_id,
            TaskStatus::Completed,
            Some(&format!("冲突已处理: {message}")),
        ) {
            // The bound task may predate a restart; the record's own status
            // is the durable outcome.
            warn!(task = %conflict.task_id, "could not update bound task: {err}");
        }

        Ok(())
    }

    /// Keep the incoming side. With `delete_existing`, the shelved entry is
    /// removed first; without it both end up in the library.
    async fn keep_new(&self, conflict: &ConflictRecord, delete_existing: bool) -> Result<()> {
        if delete_existing {
            let existing = Path::new(&conflict.existing_path);
            if existing.exists() {
                fsutil::remove_any(existing)?;
                info!(path = %conflict.existing_path, "removed existing entry");
                self.services.db.library().delete(&conflict.work).await?;
            }
        }

        let new_path = PathBuf::from(&conflict.new_path);
        if new_path.is_file() {
            self.ingest_archive(conflict, &new_path, SourceDisposition::Archive)
                .await?;
        } else if new_path.is_dir() {
            self.shelve_directory(conflict, &new_path, delete_existing)
                .await?;
        } else {
            warn!(path = %conflict.new_path, "new side no longer exists");
        }

        Ok(())
    }

    /// Remove the incoming side and leave the library untouched.
    async fn discard_new(&self, conflict: &ConflictRecord) -> Result<()> {
        let new_path = Path::new(&conflict.new_path);
        if new_path.exists() {
            fsutil::remove_any(new_path)?;
            info!(path = %conflict.new_path, "removed new side");
        }
        self.mark_source_completed(conflict).await;
        Ok(())
    }

    /// Keep both, filing the incoming side beside the existing entry with a
    /// collision suffix; the source archive is deleted rather than pooled.
    async fn merge(&self, conflict: &ConflictRecord) -> Result<()> {
        let new_path = PathBuf::from(&conflict.new_path);
        if new_path.is_file() {
            self.ingest_archive(conflict, &new_path, SourceDisposition::Delete)
                .await?;
        } else if new_path.is_dir() {
            self.shelve_directory(conflict, &new_path, false).await?;
        } else {
            warn!(path = %conflict.new_path, "new side no longer exists");
        }
        self.mark_source_completed(conflict).await;
        Ok(())
    }

    /// Run the extract-to-classify pipeline for an archive new side.
    async fn ingest_archive(
        &self,
        conflict: &ConflictRecord,
        archive: &Path,
        disposition: SourceDisposition,
    ) -> Result<()> {
        let config = self.services.config.current();

        let inside_pool = archive.starts_with(&config.storage.processed_archives_path);
        let task = IngestTask::with_options(
            TaskKind::AutoIngest,
            archive.to_path_buf(),
            true,
            inside_pool,
        );
        task.start();

        let extracted = self.services.extractor.extract(&task, &config).await?;
        let metadata = self
            .services
            .resolver
            .resolve(&extracted, &config.metadata)
            .await?;
        let renamed = transform::rename_directory(&extracted, &metadata, &config.rename)?;
        apply_filters(&renamed, &config.filter);

        let mut shaped = renamed;
        if config.rename.flatten_single_subfolder {
            shaped = transform::flatten_single_subfolder(&shaped, config.rename.flatten_depth);
        }
        if config.rename.remove_empty_folders {
            transform::remove_empty_dirs(&shaped, false);
        }

        let final_path = self
            .services
            .classifier
            .file_into_library(&shaped, &metadata, &config)
            .await?;
        info!(path = %final_path.display(), "resolution re-ingest filed");

        match disposition {
            SourceDisposition::Archive => {
                archival::archive_source(&self.services, &task, &config).await;
            }
            SourceDisposition::Delete => {
                if archive.exists() {
                    std::fs::remove_file(archive)?;
                    info!(path = %archive.display(), "deleted source archive after merge");
                }
                self.mark_source_completed(conflict).await;
            }
        }

        Ok(())
    }

    /// File a directory new side into the library under its basename.
    async fn shelve_directory(
        &self,
        conflict: &ConflictRecord,
        directory: &Path,
        update_ledger: bool,
    ) -> Result<()> {
        let config = self.services.config.current();
        let final_path = fsutil::move_into(directory, &config.storage.library_path)?;

        if update_ledger {
            let (folder_size, file_count) = fsutil::dir_stats(&final_path);
            self.services
                .db
                .library()
                .replace(&LibrarySnapshot {
                    work: conflict.work.clone(),
                    folder_path: final_path.to_string_lossy().to_string(),
                    folder_size,
                    file_count,
                    scanned_at: Utc::now(),
                })
                .await?;
        }

        info!(path = %final_path.display(), "directory shelved");
        Ok(())
    }

    /// Flip any archived-source row tied to the conflict's new side back to
    /// completed. Best-effort.
    async fn mark_source_completed(&self, conflict: &ConflictRecord) {
        let Some(filename) = Path::new(&conflict.new_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
        else {
            return;
        };

        let repo = self.services.db.archived();
        match repo.find_by_filename(&filename).await {
            Ok(Some(_)) => {
                if let Err(err) = repo
                    .set_status(&filename, ArchivedSourceStatus::Completed)
                    .await
                {
                    warn!(filename = %filename, "could not mark archived source completed: {err}");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(filename = %filename, "archived-source lookup failed: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auris_config::{AppConfig, ConfigHandle};
    use auris_model::{ConflictKind, TaskId, WorkCode};
    use crate::db::Database;

    async fn setup(dir: &Path) -> (Arc<Services>, Arc<TaskEngine>, ConflictResolver) {
        let mut config = AppConfig::default();
        config.storage.library_path = dir.join("library");
        config.storage.temp_path = dir.join("temp");
        config.storage.processed_archives_path = dir.join("processed");

        let db = Database::open_in_memory().await.unwrap();
        let services = Services::build(db, ConfigHandle::new(config)).unwrap();
        let engine = TaskEngine::new(Arc::clone(&services));
        let resolver = ConflictResolver::new(Arc::clone(&services), Arc::clone(&engine));
        (services, engine, resolver)
    }

    async fn pending_conflict(
        services: &Arc<Services>,
        work: &str,
        existing: &Path,
        new_side: &Path,
    ) -> ConflictRecord {
        let work = WorkCode::parse(work).unwrap();
        services
            .db
            .conflicts()
            .insert_pending(
                TaskId::new(),
                &work,
                ConflictKind::Duplicate,
                &existing.to_string_lossy(),
                &new_side.to_string_lossy(),
                serde_json::json!({}),
                serde_json::json!([]),
                serde_json::json!({}),
                &[],
            )
            .await
            .unwrap();
        services
            .db
            .conflicts()
            .pending_for(&work)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_skip_deletes_new_side() {
        let dir = tempfile::tempdir().unwrap();
        let (services, _engine, resolver) = setup(dir.path()).await;

        let existing = dir.path().join("library/RJ123456 A");
        std::fs::create_dir_all(&existing).unwrap();
        let new_side = dir.path().join("input/RJ123456.zip");
        std::fs::create_dir_all(new_side.parent().unwrap()).unwrap();
        std::fs::write(&new_side, b"archive-bytes").unwrap();

        let conflict = pending_conflict(&services, "RJ123456", &existing, &new_side).await;
        resolver
            .resolve(&conflict.id, ResolutionAction::Skip)
            .await
            .unwrap();

        assert!(!new_side.exists());
        assert!(existing.exists());
        let stored = services.db.conflicts().get(&conflict.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "SKIP");
    }

    #[tokio::test]
    async fn test_keep_new_with_directory_new_side() {
        let dir = tempfile::tempdir().unwrap();
        let (services, _engine, resolver) = setup(dir.path()).await;

        let existing = dir.path().join("library/RJ123456 old");
        std::fs::create_dir_all(&existing).unwrap();
        let new_side = dir.path().join("library/_conflicts/RJ123456 new");
        std::fs::create_dir_all(&new_side).unwrap();
        std::fs::write(new_side.join("track.wav"), vec![0u8; 8]).unwrap();

        let conflict = pending_conflict(&services, "RJ123456", &existing, &new_side).await;
        resolver
            .resolve(&conflict.id, ResolutionAction::KeepNew)
            .await
            .unwrap();

        assert!(!existing.exists());
        let shelved = dir.path().join("library/RJ123456 new");
        assert!(shelved.join("track.wav").exists());

        let work = WorkCode::parse("RJ123456").unwrap();
        let snapshot = services.db.library().get(&work).await.unwrap().unwrap();
        assert_eq!(snapshot.folder_path, shelved.to_string_lossy());
    }

    #[tokio::test]
    async fn test_keep_both_preserves_existing() {
        let dir = tempfile::tempdir().unwrap();
        let (services, _engine, resolver) = setup(dir.path()).await;

        let existing = dir.path().join("library/RJ123456 old");
        std::fs::create_dir_all(&existing).unwrap();
        let new_side = dir.path().join("library/_conflicts/RJ123456 new");
        std::fs::create_dir_all(&new_side).unwrap();

        let conflict = pending_conflict(&services, "RJ123456", &existing, &new_side).await;
        resolver
            .resolve(&conflict.id, ResolutionAction::KeepBoth)
            .await
            .unwrap();

        assert!(existing.exists());
        assert!(dir.path().join("library/RJ123456 new").exists());
    }

    #[tokio::test]
    async fn test_double_resolution_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (services, _engine, resolver) = setup(dir.path()).await;

        let existing = dir.path().join("library/RJ123456 A");
        std::fs::create_dir_all(&existing).unwrap();
        let new_side = dir.path().join("new-dir");
        std::fs::create_dir(&new_side).unwrap();

        let conflict = pending_conflict(&services, "RJ123456", &existing, &new_side).await;
        resolver
            .resolve(&conflict.id, ResolutionAction::Skip)
            .await
            .unwrap();
        assert!(
            resolver
                .resolve(&conflict.id, ResolutionAction::Skip)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_unknown_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let (_services, _engine, resolver) = setup(dir.path()).await;
        assert!(
            resolver
                .resolve("missing", ResolutionAction::Skip)
                .await
                .is_err()
        );
    }
}
