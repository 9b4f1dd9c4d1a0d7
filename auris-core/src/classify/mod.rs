//! Classification of finished works into the library tree.
//!
//! The rule list is evaluated in order; the first enabled rule that
//! produces a path wins, and an empty path means the library root. Rule
//! evaluation is pure; the [`Classifier`] performs the move and ledger
//! update.

mod rules;

pub use rules::{classification_path, sanitize_segment};

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use auris_config::AppConfig;
use auris_model::{LibrarySnapshot, WorkMetadata};

use crate::db::LibraryRepo;
use crate::error::Result;
use crate::fsutil;

/// Quarantine subdirectory under the library root.
pub const CONFLICT_DIR: &str = "_conflicts";

/// Moves classified works into the library and keeps the ledger current.
#[derive(Debug, Clone)]
pub struct Classifier {
    library: LibraryRepo,
}

impl Classifier {
    pub fn new(library: LibraryRepo) -> Self {
        Self { library }
    }

    /// File `source` under the classified location and refresh its ledger
    /// row. Returns the final path.
    pub async fn file_into_library(
        &self,
        source: &Path,
        metadata: &WorkMetadata,
        config: &AppConfig,
    ) -> Result<PathBuf> {
        let relative = classification_path(metadata, &config.classification);
        let target_dir = if relative.is_empty() {
            config.storage.library_path.clone()
        } else {
            config.storage.library_path.join(&relative)
        };

        let final_path = fsutil::move_into(source, &target_dir)?;
        self.record_snapshot(metadata, &final_path).await?;

        info!(
            work = %metadata.work,
            path = %final_path.display(),
            rule_path = %relative,
            "filed into library"
        );
        Ok(final_path)
    }

    /// Move `source` into the quarantine directory instead of the library
    /// proper. No ledger row is written for quarantined works.
    pub async fn quarantine(&self, source: &Path, config: &AppConfig) -> Result<PathBuf> {
        let conflict_dir = config.storage.library_path.join(CONFLICT_DIR);
        let final_path = fsutil::move_into(source, &conflict_dir)?;
        info!(path = %final_path.display(), "quarantined pending manual resolution");
        Ok(final_path)
    }

    /// Delete-then-insert the ledger row for a freshly placed folder.
    pub async fn record_snapshot(&self, metadata: &WorkMetadata, path: &Path) -> Result<()> {
        let (folder_size, file_count) = fsutil::dir_stats(path);
        self.library
            .replace(&LibrarySnapshot {
                work: metadata.work.clone(),
                folder_path: path.to_string_lossy().to_string(),
                folder_size,
                file_count,
                scanned_at: Utc::now(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auris_config::ClassificationRule;
    use auris_model::{AgeCategory, WorkCode};

    fn metadata() -> WorkMetadata {
        WorkMetadata {
            work: WorkCode::parse("RJ123456").unwrap(),
            work_name: "作品".to_string(),
            maker_id: "RG001".to_string(),
            maker_name: "社团".to_string(),
            release_date: "2024-03-05".to_string(),
            series_id: None,
            series_name: None,
            age_category: AgeCategory::Adult,
            tags: vec![],
            cvs: vec![],
            cover_url: String::new(),
            cached_at: Utc::now(),
            expires_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_file_into_library_root_and_snapshot() {
        let db = crate::db::Database::open_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        let mut config = AppConfig::default();
        config.storage.library_path = dir.path().join("library");
        config.classification = vec![ClassificationRule::none()];

        let source = dir.path().join("RJ123456 作品");
        std::fs::create_dir(&source).unwrap();
        std::fs::write(source.join("track.wav"), vec![0u8; 16]).unwrap();

        let classifier = Classifier::new(db.library());
        let metadata = metadata();
        let final_path = classifier
            .file_into_library(&source, &metadata, &config)
            .await
            .unwrap();

        assert_eq!(final_path, config.storage.library_path.join("RJ123456 作品"));
        assert!(final_path.join("track.wav").exists());

        let snapshot = db.library().get(&metadata.work).await.unwrap().unwrap();
        assert_eq!(snapshot.folder_size, 16);
        assert_eq!(snapshot.file_count, 1);
    }

    #[tokio::test]
    async fn test_collision_gets_suffix() {
        let db = crate::db::Database::open_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        let mut config = AppConfig::default();
        config.storage.library_path = dir.path().join("library");
        std::fs::create_dir_all(config.storage.library_path.join("RJ123456 作品")).unwrap();

        let source = dir.path().join("RJ123456 作品");
        std::fs::create_dir(&source).unwrap();

        let classifier = Classifier::new(db.library());
        let final_path = classifier
            .file_into_library(&source, &metadata(), &config)
            .await
            .unwrap();
        assert_eq!(
            final_path,
            config.storage.library_path.join("RJ123456 作品(1)")
        );
    }

    #[tokio::test]
    async fn test_quarantine_goes_under_conflicts() {
        let db = crate::db::Database::open_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        let mut config = AppConfig::default();
        config.storage.library_path = dir.path().join("library");

        let source = dir.path().join("RJ123456 作品");
        std::fs::create_dir(&source).unwrap();

        let classifier = Classifier::new(db.library());
        let final_path = classifier.quarantine(&source, &config).await.unwrap();
        assert_eq!(
            final_path,
            config
                .storage
                .library_path
                .join(CONFLICT_DIR)
                .join("RJ123456 作品")
        );
    }
}
