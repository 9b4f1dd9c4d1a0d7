use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};

use auris_config::AppConfig;
use auris_model::{ConflictKind, TaskKind, TaskStatus, WorkCode};

use crate::dedupe::{DuplicateCheckResult, resolution_options};
use crate::error::{IngestError, Result};
use crate::extract::output_stem;
use crate::transform;
use crate::{fsutil, transform::apply_filters};

use super::archival;
use super::engine::WorkRegistry;
use super::services::Services;
use super::task::IngestTask;

const CONFLICT_WAIT_MESSAGE: &str = "waiting manual: 重复作品，请在问题作品页面处理";

/// Linkage languages consulted for the existing-folder pre-check.
fn default_cue_languages() -> Vec<String> {
    vec![
        "CHI_HANS".to_string(),
        "CHI_HANT".to_string(),
        "ENG".to_string(),
    ]
}

/// Worker entry point: run the task's pipeline, then clean up.
pub(crate) async fn run(
    services: Arc<Services>,
    registry: Arc<WorkRegistry>,
    task: Arc<IngestTask>,
) {
    if task.status().is_terminal() {
        // Cancelled while still queued.
        return;
    }

    let config = services.config.current();

    task.start();
    info!(task = %task.id, kind = ?task.kind, source = %task.source_path.display(), "worker started");

    let outcome = match task.kind {
        TaskKind::AutoIngest => auto_ingest(&registry, &services, &task, &config).await,
        TaskKind::ExistingFolder => existing_folder(&registry, &services, &task, &config).await,
        TaskKind::ExtractOnly => extract_only(&services, &task, &config).await,
        TaskKind::MetadataOnly => metadata_only(&services, &task, &config).await,
        TaskKind::FilterOnly => filter_only(&task, &config).await,
        TaskKind::RenameOnly => rename_only(&services, &task, &config).await,
    };

    match outcome {
        Ok(()) => {}
        Err(IngestError::Cancelled) => {
            // cancel() already drove the task terminal.
            info!(task = %task.id, "worker observed cancellation");
        }
        Err(err) => {
            error!(task = %task.id, "task failed: {err}");
            task.fail(&err.to_string());
        }
    }

    cleanup_terminal(&task, &config).await;

    if let Some(work) = task.work() {
        registry.release(&work);
    }
}

/// Full automatic pipeline for a watched archive.
async fn auto_ingest(
    registry: &Arc<WorkRegistry>,
    services: &Arc<Services>,
    task: &Arc<IngestTask>,
    config: &AppConfig,
) -> Result<()> {
    task.update_progress(5, "预检中");
    let work = WorkCode::find_in_path(&task.source_path);

    if let Some(work) = &work
        && task.auto_classify
        && precheck_claim(registry, services, task, work, config).await?
    {
        return Ok(());
    }

    task.update_progress(10, "解压中");
    let extracted = services.extractor.extract(task, config).await?;
    task.set_output_path(extracted.clone());

    task.checkpoint().await?;
    task.update_progress(40, "获取元数据");
    let metadata = services.resolver.resolve(&extracted, &config.metadata).await?;
    task.set_metadata(metadata.clone());

    task.checkpoint().await?;
    task.update_progress(60, "重命名文件夹");
    let renamed = transform::rename_directory(&extracted, &metadata, &config.rename)?;
    task.set_output_path(renamed.clone());

    task.checkpoint().await?;
    task.update_progress(75, "过滤文件中");
    apply_filters(&renamed, &config.filter);

    task.checkpoint().await?;
    let shaped = shape_tree(task, &renamed, config);

    task.checkpoint().await?;
    let mut quarantined = false;
    if task.auto_classify {
        task.update_progress(80, "智能分类");
        quarantined = classify_stage(services, task, &shaped, &metadata, config).await?;
    }

    task.update_progress(95, "归档压缩包");
    archival::archive_source(services, task, config).await;

    if quarantined {
        task.complete_with_message("waiting manual: 发现重复作品，等待手动处理");
    } else {
        task.update_progress(100, "完成");
        task.complete();
    }
    Ok(())
}

/// Ingest of a folder the operator placed by hand; extraction is skipped
/// and the pre-check walks the full linkage graph.
async fn existing_folder(
    registry: &Arc<WorkRegistry>,
    services: &Arc<Services>,
    task: &Arc<IngestTask>,
    config: &AppConfig,
) -> Result<()> {
    let folder = task.source_path.clone();

    task.update_progress(5, "预检中");
    let work = WorkCode::find_in_path(&folder);

    if let Some(work) = &work
        && task.auto_classify
    {
        let check = services
            .detector
            .check_enhanced(
                work,
                &config.storage.library_path,
                true,
                &default_cue_languages(),
            )
            .await?;

        refresh_folder_cache(services, &folder, work, &check).await;

        if check.is_duplicate {
            record_enhanced_conflict(services, task, work, &folder, &check).await?;
            let kind = check.kind.unwrap_or(ConflictKind::Duplicate);
            task.complete_with_message(&format!(
                "waiting manual: 发现{}，请在问题作品页面处理",
                kind.display_name()
            ));
            return Ok(());
        }

        if !registry.claim(work) {
            services
                .db
                .conflicts()
                .insert_pending(
                    task.id,
                    work,
                    ConflictKind::Duplicate,
                    "正在处理中",
                    &folder.to_string_lossy(),
                    json!({}),
                    json!([]),
                    json!({}),
                    &[],
                )
                .await?;
            task.complete_with_message("waiting manual: 正在处理中，请在问题作品页面查看");
            return Ok(());
        }
        task.set_work(work.clone());
    }

    task.checkpoint().await?;
    task.update_progress(30, "获取元数据");
    let metadata = services.resolver.resolve(&folder, &config.metadata).await?;
    task.set_metadata(metadata.clone());

    task.checkpoint().await?;
    task.update_progress(50, "重命名文件夹");
    let renamed = transform::rename_directory(&folder, &metadata, &config.rename)?;

    task.checkpoint().await?;
    task.update_progress(70, "过滤文件中");
    apply_filters(&renamed, &config.filter);

    task.checkpoint().await?;
    let shaped = shape_tree(task, &renamed, config);

    task.checkpoint().await?;
    if task.auto_classify {
        task.update_progress(80, "智能分类");
        let quarantined = classify_stage(services, task, &shaped, &metadata, config).await?;

        // The folder has left the staging area either way; drop its scan
        // cache entry.
        if let Err(err) = services
            .db
            .folder_cache()
            .delete(&folder.to_string_lossy())
            .await
        {
            warn!(folder = %folder.display(), "folder cache cleanup failed: {err}");
        }

        if quarantined {
            task.complete_with_message("waiting manual: 发现重复作品，等待手动处理");
            return Ok(());
        }
    } else {
        task.set_output_path(shaped);
    }

    task.update_progress(100, "完成");
    task.complete();
    Ok(())
}

async fn extract_only(
    services: &Arc<Services>,
    task: &Arc<IngestTask>,
    config: &AppConfig,
) -> Result<()> {
    let extracted = services.extractor.extract(task, config).await?;
    task.set_output_path(extracted);
    task.complete();
    Ok(())
}

async fn metadata_only(
    services: &Arc<Services>,
    task: &Arc<IngestTask>,
    config: &AppConfig,
) -> Result<()> {
    let metadata = services
        .resolver
        .resolve(&task.source_path, &config.metadata)
        .await?;
    task.set_metadata(metadata);
    task.complete();
    Ok(())
}

async fn filter_only(task: &Arc<IngestTask>, config: &AppConfig) -> Result<()> {
    apply_filters(&task.source_path, &config.filter);
    task.complete();
    Ok(())
}

async fn rename_only(
    services: &Arc<Services>,
    task: &Arc<IngestTask>,
    config: &AppConfig,
) -> Result<()> {
    let metadata = services
        .resolver
        .resolve(&task.source_path, &config.metadata)
        .await?;
    task.set_metadata(metadata.clone());
    let renamed = transform::rename_directory(&task.source_path, &metadata, &config.rename)?;
    task.set_output_path(renamed);
    task.complete();
    Ok(())
}

/// Pre-extraction duplicate gate for the automatic pipeline.
///
/// Records a pending conflict and completes the task early when the work
/// is already shelved or owned by another worker; otherwise claims the
/// work code. Returns whether the task finished here.
async fn precheck_claim(
    registry: &Arc<WorkRegistry>,
    services: &Arc<Services>,
    task: &Arc<IngestTask>,
    work: &WorkCode,
    config: &AppConfig,
) -> Result<bool> {
    let source = task.source_path.to_string_lossy().to_string();

    if registry.is_in_flight(work) {
        warn!(work = %work, "work already being processed by another task");
        services
            .db
            .conflicts()
            .insert_pending(
                task.id,
                work,
                ConflictKind::Duplicate,
                "正在处理中",
                &source,
                json!({}),
                json!([]),
                json!({}),
                &[],
            )
            .await?;
        task.complete_with_message(CONFLICT_WAIT_MESSAGE);
        return Ok(true);
    }

    if let Some(hit) = services
        .detector
        .check_direct(work, &config.storage.library_path)
        .await?
    {
        info!(work = %work, existing = %hit.path, "duplicate found before extraction");
        services
            .db
            .conflicts()
            .insert_pending(
                task.id,
                work,
                ConflictKind::Duplicate,
                &hit.path,
                &source,
                json!({}),
                json!([]),
                json!({}),
                &[],
            )
            .await?;
        task.complete_with_message(CONFLICT_WAIT_MESSAGE);
        return Ok(true);
    }

    if !registry.claim(work) {
        // Lost the race between the in-flight probe and the claim.
        services
            .db
            .conflicts()
            .insert_pending(
                task.id,
                work,
                ConflictKind::Duplicate,
                "正在处理中",
                &source,
                json!({}),
                json!([]),
                json!({}),
                &[],
            )
            .await?;
        task.complete_with_message(CONFLICT_WAIT_MESSAGE);
        return Ok(true);
    }

    task.set_work(work.clone());
    Ok(false)
}

/// Flatten and prune under the rename config.
fn shape_tree(task: &IngestTask, path: &Path, config: &AppConfig) -> PathBuf {
    let mut current = path.to_path_buf();
    if config.rename.flatten_single_subfolder {
        task.update_progress(78, "扁平化文件夹结构");
        current = transform::flatten_single_subfolder(&current, config.rename.flatten_depth);
    }
    if config.rename.remove_empty_folders {
        task.update_progress(79, "清理空文件夹");
        transform::remove_empty_dirs(&current, false);
    }
    current
}

/// Classification with the late duplicate gate.
///
/// Returns true when the work had to be quarantined instead of filed.
async fn classify_stage(
    services: &Arc<Services>,
    task: &Arc<IngestTask>,
    source: &Path,
    metadata: &auris_model::WorkMetadata,
    config: &AppConfig,
) -> Result<bool> {
    task.update_progress(82, "检查重复");
    if let Some(hit) = services
        .detector
        .check_direct(&metadata.work, &config.storage.library_path)
        .await?
    {
        warn!(work = %metadata.work, existing = %hit.path, "duplicate discovered at classify time");
        let final_path = services.classifier.quarantine(source, config).await?;
        services
            .db
            .conflicts()
            .insert_pending(
                task.id,
                &metadata.work,
                ConflictKind::Duplicate,
                &hit.path,
                &final_path.to_string_lossy(),
                serde_json::to_value(metadata)?,
                json!([]),
                json!({}),
                &[],
            )
            .await?;
        task.set_output_path(final_path);
        return Ok(true);
    }

    task.update_progress(85, "应用分类规则");
    task.update_progress(90, "移动到库存");
    let final_path = services
        .classifier
        .file_into_library(source, metadata, config)
        .await?;
    task.set_output_path(final_path);
    Ok(false)
}

/// Record a conflict discovered by the enhanced (linkage-aware) check.
async fn record_enhanced_conflict(
    services: &Arc<Services>,
    task: &Arc<IngestTask>,
    work: &WorkCode,
    new_path: &Path,
    check: &DuplicateCheckResult,
) -> Result<()> {
    let kind = check.kind.unwrap_or(ConflictKind::Duplicate);
    let existing_path = check
        .direct
        .as_ref()
        .map(|hit| hit.path.clone())
        .or_else(|| check.linked_found.first().map(|hit| hit.path.clone()))
        .unwrap_or_else(|| "未知路径".to_string());

    let linked_info = check
        .linked_found
        .iter()
        .map(|hit| {
            json!({
                "rjcode": hit.work.as_str(),
                "work_type": hit.relation.as_str(),
                "lang": hit.lang,
                "path": hit.path,
                "size": hit.size,
                "work_name": hit.work_name,
            })
        })
        .collect::<Vec<_>>();

    // Stash the synthesised choices so the resolution surface can present
    // them without re-running the detector.
    let mut analysis = check.analysis.clone();
    analysis["resolution_options"] = serde_json::to_value(resolution_options(check))?;

    services
        .db
        .conflicts()
        .insert_pending(
            task.id,
            work,
            kind,
            &existing_path,
            &new_path.to_string_lossy(),
            json!({}),
            json!(linked_info),
            analysis,
            &check.related_works,
        )
        .await?;
    Ok(())
}

/// Best-effort refresh of the folder-scan cache after a pre-check.
async fn refresh_folder_cache(
    services: &Arc<Services>,
    folder: &Path,
    work: &WorkCode,
    check: &DuplicateCheckResult,
) {
    let (folder_size, file_count) = fsutil::dir_stats(folder);
    let now = chrono::Utc::now();
    let entry = auris_model::FolderScanCacheEntry {
        folder_path: folder.to_string_lossy().to_string(),
        folder_name: folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        work: Some(work.clone()),
        duplicate_info: Some(json!({
            "is_duplicate": check.is_duplicate,
            "conflict_type": check.kind.map(|k| k.as_str()),
            "related_rjcodes": check.related_works,
        })),
        file_count,
        folder_size,
        cached_at: now,
        updated_at: now,
        needs_refresh: false,
    };
    if let Err(err) = services.db.folder_cache().upsert(&entry).await {
        warn!(folder = %folder.display(), "folder cache refresh failed: {err}");
    }
}

/// Terminal cleanup: failed tasks lose their temp output, automatic
/// ingests lose any leftover temp variants. Operator-provided folders are
/// never touched.
async fn cleanup_terminal(task: &Arc<IngestTask>, config: &AppConfig) {
    if task.kind == TaskKind::ExistingFolder {
        return;
    }

    let failed = task.status() == TaskStatus::Failed;

    if failed
        && let Some(output) = task.output_path()
        && output.starts_with(&config.storage.temp_path)
        && output.exists()
    {
        match std::fs::remove_dir_all(&output) {
            Ok(()) => info!(path = %output.display(), "removed failed task output"),
            Err(err) => warn!(path = %output.display(), "failed to remove output: {err}"),
        }
    }

    if failed && task.kind == TaskKind::AutoIngest {
        let stem = output_stem(&task.source_path);
        let variants = [
            stem.clone(),
            format!("{stem}_1"),
            format!("{stem}_2"),
            format!("{stem}_3"),
            format!("{stem}_temp"),
        ];
        for name in variants {
            let path = config.storage.temp_path.join(name);
            if path.exists() {
                fsutil::remove_dir_with_retries(&path, 3, std::time::Duration::from_secs(1))
                    .await;
            }
        }
    }
}
