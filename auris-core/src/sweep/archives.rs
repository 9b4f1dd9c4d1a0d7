use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use auris_config::{ArchiveSweepStrategy, ConfigHandle};
use auris_model::{ArchiveSweepLog, ArchivedSource};

use crate::db::Database;
use crate::error::Result;

use super::schedule::parse_crontab;

/// Result of one archived-pool sweep (or its preview).
#[derive(Debug, Clone)]
pub struct ArchiveSweepOutcome {
    pub deleted_count: usize,
    pub freed_bytes: i64,
    pub deleted: Vec<Value>,
    pub dry_run: bool,
    pub config_snapshot: Value,
}

fn record_summary(record: &ArchivedSource) -> Value {
    json!({
        "id": record.id,
        "filename": record.filename,
        "rjcode": record.work.as_ref().map(|w| w.as_str()),
        "file_size": record.file_size,
        "processed_at": record.processed_at.to_rfc3339(),
        "process_count": record.process_count,
    })
}

/// Victim selection for one strategy over rows sorted oldest-first.
fn select_victims(
    rows: &[ArchivedSource],
    strategy: ArchiveSweepStrategy,
    preserve_days: i64,
    max_count: usize,
    max_size_gb: f64,
) -> Vec<ArchivedSource> {
    match strategy {
        ArchiveSweepStrategy::Age => {
            let cutoff = Utc::now() - Duration::days(preserve_days);
            rows.iter()
                .filter(|row| row.processed_at <= cutoff)
                .cloned()
                .collect()
        }
        ArchiveSweepStrategy::Count => {
            if rows.len() > max_count {
                rows[..rows.len() - max_count].to_vec()
            } else {
                Vec::new()
            }
        }
        ArchiveSweepStrategy::Size => {
            let max_bytes = (max_size_gb * 1024.0 * 1024.0 * 1024.0) as i64;
            let mut total: i64 = rows.iter().map(|row| row.file_size).sum();
            let mut victims = Vec::new();
            for row in rows {
                if total <= max_bytes {
                    break;
                }
                total -= row.file_size;
                victims.push(row.clone());
            }
            victims
        }
    }
}

/// Cron-driven sweep of the archived-source pool.
pub struct ArchiveSweeper {
    db: Database,
    config: ConfigHandle,
    job: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for ArchiveSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSweeper")
            .field("running", &self.is_running())
            .finish()
    }
}

impl ArchiveSweeper {
    pub fn new(db: Database, config: ConfigHandle) -> Arc<Self> {
        Arc::new(Self {
            db,
            config,
            job: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.job
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|job| !job.is_finished())
    }

    pub fn start(self: &Arc<Self>) -> Result<()> {
        let sweep_config = self.config.current().processed_archive_cleanup.clone();
        if !sweep_config.enabled {
            info!("archive sweeper disabled");
            return Ok(());
        }
        if self.is_running() {
            info!("archive sweeper already running");
            return Ok(());
        }

        let schedule = parse_crontab(&sweep_config.cron_expression)?;
        info!(
            cron = %sweep_config.cron_expression,
            strategy = ?sweep_config.strategy,
            "archive sweeper scheduled"
        );

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                match this.run_now(false).await {
                    Ok(outcome) => info!(
                        deleted = outcome.deleted_count,
                        freed_mb = outcome.freed_bytes / (1024 * 1024),
                        "archive sweep finished"
                    ),
                    Err(err) => error!("archive sweep failed: {err}"),
                }
            }
        });
        *self.job.lock().unwrap() = Some(handle);
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(job) = self.job.lock().unwrap().take() {
            job.abort();
            info!("archive sweeper stopped");
        }
    }

    /// Restart after a configuration change.
    pub fn restart(self: &Arc<Self>) -> Result<()> {
        self.stop();
        self.start()
    }

    /// Select victims per the configured strategy and (unless `dry_run`)
    /// delete their files and rows in one transaction, then log the run.
    pub async fn run_now(&self, dry_run: bool) -> Result<ArchiveSweepOutcome> {
        let sweep_config = self.config.current().processed_archive_cleanup.clone();

        let config_snapshot = json!({
            "strategy": sweep_config.strategy,
            "preserve_days": sweep_config.preserve_days,
            "max_count": sweep_config.max_count,
            "max_size_gb": sweep_config.max_size_gb,
            "exclude_reprocessing": sweep_config.exclude_reprocessing,
        });

        if !sweep_config.enabled && !dry_run {
            return Ok(ArchiveSweepOutcome {
                deleted_count: 0,
                freed_bytes: 0,
                deleted: Vec::new(),
                dry_run,
                config_snapshot,
            });
        }

        let rows = self
            .db
            .archived()
            .list_oldest_first(sweep_config.exclude_reprocessing)
            .await?;

        let victims = select_victims(
            &rows,
            sweep_config.strategy,
            sweep_config.preserve_days,
            sweep_config.max_count,
            sweep_config.max_size_gb,
        );

        let deleted: Vec<Value> = victims.iter().map(record_summary).collect();
        let freed_bytes: i64 = victims.iter().map(|row| row.file_size).sum();

        if !dry_run && !victims.is_empty() {
            for victim in &victims {
                let path = Path::new(&victim.current_path);
                if path.exists()
                    && let Err(err) = std::fs::remove_file(path)
                {
                    warn!(file = %victim.current_path, "could not delete archived file: {err}");
                }
            }

            let ids: Vec<String> = victims.iter().map(|row| row.id.clone()).collect();
            let removed = self.db.archived().delete_rows(&ids).await?;

            self.db
                .cleanup_logs()
                .insert_archive_log(
                    removed as i64,
                    freed_bytes,
                    config_snapshot.clone(),
                    json!(
                        deleted
                            .iter()
                            .map(|summary| {
                                json!({
                                    "id": summary["id"],
                                    "filename": summary["filename"],
                                    "rjcode": summary["rjcode"],
                                    "file_size": summary["file_size"],
                                })
                            })
                            .collect::<Vec<_>>()
                    ),
                )
                .await?;
            info!(
                removed,
                freed_mb = freed_bytes / (1024 * 1024),
                "archive sweep deleted files"
            );
        }

        Ok(ArchiveSweepOutcome {
            deleted_count: victims.len(),
            freed_bytes,
            deleted,
            dry_run,
            config_snapshot,
        })
    }

    /// Victim list without deleting anything.
    pub async fn preview(&self) -> Result<ArchiveSweepOutcome> {
        self.run_now(true).await
    }

    pub async fn history(&self, limit: i64) -> Result<Vec<ArchiveSweepLog>> {
        self.db.cleanup_logs().archive_history(limit).await
    }
}
