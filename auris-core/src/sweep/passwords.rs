use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tracing::{error, info};

use auris_config::ConfigHandle;
use auris_model::{PasswordEntry, PasswordSweepLog};

use crate::db::Database;
use crate::error::Result;

use super::schedule::parse_crontab;

/// Result of one password sweep (or its preview).
#[derive(Debug, Clone)]
pub struct PasswordSweepOutcome {
    pub deleted_count: usize,
    pub deleted: Vec<Value>,
    pub dry_run: bool,
    pub config_snapshot: Value,
}

fn entry_summary(entry: &PasswordEntry) -> Value {
    let masked = if entry.password.chars().count() > 3 {
        format!("{}***", entry.password.chars().take(3).collect::<String>())
    } else {
        "***".to_string()
    };
    json!({
        "id": entry.id,
        "password": masked,
        "rjcode": entry.work.as_ref().map(|w| w.as_str()),
        "filename": entry.filename,
        "use_count": entry.use_count,
        "source": entry.source.as_str(),
        "created_at": entry.created_at.to_rfc3339(),
        "last_used_at": entry.last_used_at.map(|t| t.to_rfc3339()),
    })
}

/// Cron-driven sweep of barely-used password vault entries.
pub struct PasswordSweeper {
    db: Database,
    config: ConfigHandle,
    job: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for PasswordSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordSweeper")
            .field("running", &self.is_running())
            .finish()
    }
}

impl PasswordSweeper {
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

    /// Start the cron loop. A disabled config is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let sweep_config = self.config.current().password_cleanup.clone();
        if !sweep_config.enabled {
            info!("password sweeper disabled");
            return Ok(());
        }
        if self.is_running() {
            info!("password sweeper already running");
            return Ok(());
        }

        let schedule = parse_crontab(&sweep_config.cron_expression)?;
        info!(
            cron = %sweep_config.cron_expression,
            max_use_count = sweep_config.max_use_count,
            preserve_days = sweep_config.preserve_days,
            "password sweeper scheduled"
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
                    Ok(outcome) => {
                        info!(deleted = outcome.deleted_count, "password sweep finished")
                    }
                    Err(err) => error!("password sweep failed: {err}"),
                }
            }
        });
        *self.job.lock().unwrap() = Some(handle);
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(job) = self.job.lock().unwrap().take() {
            job.abort();
            info!("password sweeper stopped");
        }
    }

    /// Restart after a configuration change.
    pub fn restart(self: &Arc<Self>) -> Result<()> {
        self.stop();
        self.start()
    }

    /// Select and (unless `dry_run`) delete eligible entries, writing one
    /// audit row per effective run.
    pub async fn run_now(&self, dry_run: bool) -> Result<PasswordSweepOutcome> {
        let sweep_config = self.config.current().password_cleanup.clone();
        let cutoff = Utc::now() - Duration::days(sweep_config.preserve_days);

        let config_snapshot = json!({
            "max_use_count": sweep_config.max_use_count,
            "preserve_days": sweep_config.preserve_days,
            "exclude_sources": sweep_config.exclude_sources,
            "cutoff_date": cutoff.to_rfc3339(),
        });

        if !sweep_config.enabled && !dry_run {
            return Ok(PasswordSweepOutcome {
                deleted_count: 0,
                deleted: Vec::new(),
                dry_run,
                config_snapshot,
            });
        }

        let candidates = self
            .db
            .passwords()
            .sweep_candidates(
                sweep_config.max_use_count,
                cutoff,
                &sweep_config.exclude_sources,
            )
            .await?;

        let deleted: Vec<Value> = candidates.iter().map(entry_summary).collect();

        if !dry_run && !candidates.is_empty() {
            let ids: Vec<String> = candidates.iter().map(|entry| entry.id.clone()).collect();
            let removed = self.db.passwords().delete_rows(&ids).await?;

            self.db
                .cleanup_logs()
                .insert_password_log(
                    removed as i64,
                    config_snapshot.clone(),
                    json!(
                        deleted
                            .iter()
                            .map(|summary| {
                                json!({
                                    "id": summary["id"],
                                    "rjcode": summary["rjcode"],
                                    "use_count": summary["use_count"],
                                    "source": summary["source"],
                                })
                            })
                            .collect::<Vec<_>>()
                    ),
                )
                .await?;
            info!(removed, "deleted low-use passwords");
        }

        Ok(PasswordSweepOutcome {
            deleted_count: candidates.len(),
            deleted,
            dry_run,
            config_snapshot,
        })
    }

    /// Victim list without deleting anything.
    pub async fn preview(&self) -> Result<PasswordSweepOutcome> {
        self.run_now(true).await
    }

    pub async fn history(&self, limit: i64) -> Result<Vec<PasswordSweepLog>> {
        self.db.cleanup_logs().password_history(limit).await
    }
}
