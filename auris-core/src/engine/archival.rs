use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use tracing::{error, info, warn};
use uuid::Uuid;

use auris_config::AppConfig;
use auris_model::{ArchivedSource, ArchivedSourceStatus, WorkCode};

use crate::db::Database;
use crate::error::Result;
use crate::fsutil;

use super::services::Services;
use super::task::IngestTask;

fn volume_part_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(.*)\.part(\d+)\.(rar|zip|7z|exe)$").unwrap())
}

/// All files to archive alongside `source`: the file itself plus, for the
/// first part of a volume set, every sibling part sharing its base name.
fn files_to_archive(source: &Path) -> Vec<PathBuf> {
    let mut files = vec![source.to_path_buf()];

    let Some(filename) = source.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return files;
    };
    let Some(caps) = volume_part_pattern().captures(&filename) else {
        return files;
    };
    let base = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
    let Some(directory) = source.parent() else {
        return files;
    };

    let sibling_pattern = Regex::new(&format!(
        r"(?i)^{}\.part\d+\.(rar|zip|7z|exe)$",
        regex::escape(&base)
    ))
    .expect("escaped base name always compiles");

    if let Ok(entries) = std::fs::read_dir(directory) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if sibling_pattern.is_match(&name) && !files.contains(&entry.path()) {
                files.push(entry.path());
            }
        }
    }

    if files.len() > 1 {
        info!(base = %base, count = files.len(), "archiving complete volume set");
    }
    files
}

/// Move the task's source archive (and volume siblings) into the archived
/// pool and keep the bookkeeping row current. Best-effort: archival
/// problems are logged, never failed, because the library entry already
/// exists by the time this runs.
pub(crate) async fn archive_source(services: &Arc<Services>, task: &IngestTask, config: &AppConfig) {
    if let Err(err) = archive_source_inner(services, task, config).await {
        error!(task = %task.id, "source archival failed: {err}");
    }
}

async fn archive_source_inner(
    services: &Arc<Services>,
    task: &IngestTask,
    config: &AppConfig,
) -> Result<()> {
    let source = &task.source_path;
    let repo = services.db.archived();

    if task.skip_archive {
        // Re-extraction from inside the pool: refresh the row, move nothing.
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if repo.touch_reprocessed(&filename, Utc::now()).await? {
            info!(filename = %filename, "refreshed archived-source row after reprocessing");
        } else if let Some(record) = repo
            .find_by_current_path(&source.to_string_lossy())
            .await?
        {
            repo.touch_reprocessed(&record.filename, Utc::now()).await?;
            info!(filename = %record.filename, "refreshed archived-source row by path");
        } else {
            warn!(filename = %filename, "no archived-source row to refresh");
        }
        return Ok(());
    }

    if !source.exists() {
        warn!(source = %source.display(), "source archive vanished before archival");
        return Ok(());
    }

    let pool = &config.storage.processed_archives_path;
    std::fs::create_dir_all(pool)?;

    let mut archived: Vec<(String, PathBuf, PathBuf)> = Vec::new();
    for file in files_to_archive(source) {
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let dest = fsutil::unique_path(&pool.join(&filename));
        fsutil::move_path(&file, &dest)?;
        info!(from = %file.display(), to = %dest.display(), "source archived");
        archived.push((filename, dest, file));
    }

    // The primary file (first volume or the lone archive) carries the row.
    let Some((filename, dest, original)) = archived.into_iter().next() else {
        return Ok(());
    };
    let file_size = std::fs::metadata(&dest).map(|m| m.len() as i64).unwrap_or(0);
    let now = Utc::now();

    match repo.find_by_filename(&filename).await? {
        Some(existing) => {
            repo.record_reingest(
                &existing.id,
                &dest.to_string_lossy(),
                file_size,
                &task.id.to_string(),
                now,
            )
            .await?;
            info!(
                filename = %filename,
                count = existing.process_count + 1,
                "updated archived-source row"
            );
        }
        None => {
            repo.insert(&ArchivedSource {
                id: Uuid::new_v4().to_string(),
                original_path: original.to_string_lossy().to_string(),
                current_path: dest.to_string_lossy().to_string(),
                filename: filename.clone(),
                work: WorkCode::find_in(&filename),
                file_size,
                processed_at: now,
                process_count: 1,
                task_id: Some(task.id.to_string()),
                status: ArchivedSourceStatus::Completed,
            })
            .await?;
            info!(filename = %filename, "recorded archived source");
        }
    }

    Ok(())
}

/// Startup reconciliation of the archived pool against its table: rows
/// gain the paths and sizes of present files, rows without files are
/// dropped, duplicate rows collapse, and unknown files gain rows.
pub async fn reconcile_archived_pool(db: &Database, pool_dir: &Path) -> Result<()> {
    let mut present = Vec::new();

    if let Ok(entries) = std::fs::read_dir(pool_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().to_string();
            let size = entry.metadata().map(|m| m.len() as i64).unwrap_or(0);
            present.push((filename, path.to_string_lossy().to_string(), size));
        }
    }

    info!(files = present.len(), "reconciling archived pool");
    db.archived().reconcile(&present).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_to_archive_single() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("RJ123456.zip");
        std::fs::write(&archive, b"x").unwrap();

        assert_eq!(files_to_archive(&archive), vec![archive]);
    }

    #[test]
    fn test_files_to_archive_volume_set() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "RJ123456.part1.rar",
            "RJ123456.part2.rar",
            "RJ123456.part3.rar",
            "unrelated.part1.rar",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let files = files_to_archive(&dir.path().join("RJ123456.part1.rar"));
        assert_eq!(files.len(), 3);
        assert!(
            files
                .iter()
                .all(|f| f.file_name().unwrap().to_string_lossy().starts_with("RJ123456"))
        );
    }

    #[tokio::test]
    async fn test_reconcile_pool_end_to_end() {
        let db = Database::open_in_memory().await.unwrap();
        let pool = tempfile::tempdir().unwrap();
        std::fs::write(pool.path().join("RJ123456.zip"), vec![0u8; 64]).unwrap();

        reconcile_archived_pool(&db, pool.path()).await.unwrap();

        let record = db
            .archived()
            .find_by_filename("RJ123456.zip")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.file_size, 64);
        assert_eq!(record.work.unwrap().as_str(), "RJ123456");
    }
}
