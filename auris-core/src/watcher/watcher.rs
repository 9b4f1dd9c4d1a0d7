use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use auris_model::{TaskKind, TaskStatus};

use crate::engine::{IngestTask, TaskEngine};
use crate::error::Result;

use super::predicate::is_archive_candidate;

/// Files below this size are still being copied.
const MIN_CANDIDATE_SIZE: u64 = 1024;

/// Watcher-side stability prefilter parameters: three equal readings two
/// seconds apart, give up after five minutes.
const PREFILTER_CHECKS: u32 = 3;
const PREFILTER_INTERVAL: Duration = Duration::from_secs(2);
const PREFILTER_TIMEOUT: Duration = Duration::from_secs(300);

/// Watches the input root and escorts finished archives into the engine.
///
/// Event delivery is backed by a periodic rescan: notification APIs drop
/// events on network mounts, so the sweep re-applies the same predicate to
/// the whole tree.
pub struct InputWatcher {
    engine: Arc<TaskEngine>,
    /// Paths currently in the stability prefilter.
    pending: Mutex<HashSet<PathBuf>>,
    /// Paths already handed to the engine at least once.
    processed: Mutex<HashSet<PathBuf>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for InputWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputWatcher")
            .field("pending", &self.pending.lock().unwrap().len())
            .field("processed", &self.processed.lock().unwrap().len())
            .finish()
    }
}

impl InputWatcher {
    pub fn new(engine: Arc<TaskEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            pending: Mutex::new(HashSet::new()),
            processed: Mutex::new(HashSet::new()),
            watcher: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Subscribe to filesystem events and start the periodic sweep.
    pub fn start(self: Arc<Self>) -> Result<()> {
        let config = self.engine.services().config.current();
        if !config.watcher.enabled {
            info!("input watcher disabled by configuration");
            return Ok(());
        }

        let input_root = config.storage.input_path.clone();
        std::fs::create_dir_all(&input_root)?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        for path in event.paths {
                            let _ = event_tx.send(path);
                        }
                    }
                }
                Err(err) => error!("watch error: {err}"),
            },
        )
        .map_err(|err| crate::error::IngestError::Internal(format!("watcher setup: {err}")))?;

        watcher
            .watch(&input_root, RecursiveMode::Recursive)
            .map_err(|err| {
                crate::error::IngestError::Internal(format!(
                    "cannot watch {}: {err}",
                    input_root.display()
                ))
            })?;
        *self.watcher.lock().unwrap() = Some(watcher);

        let consumer = {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                while let Some(path) = event_rx.recv().await {
                    Self::consider(&this, &path);
                }
            })
        };

        let sweeper = {
            let this = Arc::clone(&self);
            let interval = Duration::from_secs(config.watcher.scan_interval.max(1));
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    Self::scan_input_tree(&this);
                }
            })
        };

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(consumer);
        tasks.push(sweeper);

        info!(path = %input_root.display(), "input watcher running");
        Ok(())
    }

    pub fn stop(&self) {
        *self.watcher.lock().unwrap() = None;
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        info!("input watcher stopped");
    }

    /// Apply the candidate predicate and queue the escort when it passes.
    fn consider(this: &Arc<Self>, path: &Path) {
        if !path.is_file() || !is_archive_candidate(path) {
            return;
        }

        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size < MIN_CANDIDATE_SIZE {
            debug!(path = %path.display(), size, "too small, likely mid-copy");
            return;
        }

        {
            let pending = this.pending.lock().unwrap();
            let processed = this.processed.lock().unwrap();
            if pending.contains(path) || processed.contains(path) {
                return;
            }
        }
        this.pending.lock().unwrap().insert(path.to_path_buf());

        info!(path = %path.display(), "archive detected");
        let escortee = Arc::clone(this);
        let path = path.to_path_buf();
        let handle = tokio::spawn(async move {
            escortee.escort(path).await;
        });
        this.tasks.lock().unwrap().push(handle);
    }

    /// Wait out the stability prefilter, then submit as an automatic
    /// ingest.
    async fn escort(self: Arc<Self>, path: PathBuf) {
        let config = self.engine.services().config.current();

        if !wait_stable_light(&path).await {
            warn!(path = %path.display(), "gave up waiting for file to stabilise");
            self.pending.lock().unwrap().remove(&path);
            return;
        }

        if !config.watcher.auto_start {
            info!(path = %path.display(), "auto_start disabled, leaving file in place");
            self.pending.lock().unwrap().remove(&path);
            return;
        }

        let task = IngestTask::new(
            TaskKind::AutoIngest,
            path.clone(),
            config.watcher.auto_classify,
        );
        let task_for_followup = Arc::clone(&task);
        self.engine.submit_task(task);

        self.processed.lock().unwrap().insert(path.clone());
        self.pending.lock().unwrap().remove(&path);

        if config.watcher.delete_after_process {
            let handle = tokio::spawn(async move {
                delete_after_completion(task_for_followup, path).await;
            });
            self.tasks.lock().unwrap().push(handle);
        }
    }

    /// Periodic sweep over the whole input tree with the same predicate.
    fn scan_input_tree(this: &Arc<Self>) {
        let config = this.engine.services().config.current();
        let mut stack = vec![config.storage.input_path.clone()];

        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                if this.engine.has_active_task_for(&path) {
                    continue;
                }
                Self::consider(this, &path);
            }
        }
    }
}

/// Lightweight stability wait: `PREFILTER_CHECKS` equal size readings of
/// at least the minimum size, sampled every `PREFILTER_INTERVAL`, within
/// `PREFILTER_TIMEOUT`.
async fn wait_stable_light(path: &Path) -> bool {
    let started = Instant::now();
    let mut previous: Option<u64> = None;
    let mut stable = 0;

    while stable < PREFILTER_CHECKS {
        if started.elapsed() > PREFILTER_TIMEOUT {
            return false;
        }

        match std::fs::metadata(path) {
            Ok(meta) => {
                let size = meta.len();
                if size < MIN_CANDIDATE_SIZE {
                    stable = 0;
                } else if previous == Some(size) {
                    stable += 1;
                } else {
                    stable = 0;
                }
                previous = Some(size);
            }
            Err(_) => {
                stable = 0;
            }
        }

        tokio::time::sleep(PREFILTER_INTERVAL).await;
    }

    true
}

/// When configured, remove the input file once its task completed and the
/// archival step did not already move it.
async fn delete_after_completion(task: Arc<IngestTask>, path: PathBuf) {
    loop {
        match task.status() {
            TaskStatus::Pending | TaskStatus::Running | TaskStatus::Paused => {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            status => {
                if status == TaskStatus::Completed && !task.skip_archive && path.exists() {
                    match std::fs::remove_file(&path) {
                        Ok(()) => info!(path = %path.display(), "removed ingested input file"),
                        Err(err) => {
                            warn!(path = %path.display(), "could not remove input file: {err}")
                        }
                    }
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_stable_light_accepts_steady_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();
        assert!(wait_stable_light(&path).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_stable_light_rejects_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        std::fs::write(&path, vec![0u8; 1023]).unwrap();
        assert!(!wait_stable_light(&path).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_stable_light_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!wait_stable_light(&dir.path().join("never.zip")).await);
    }
}
