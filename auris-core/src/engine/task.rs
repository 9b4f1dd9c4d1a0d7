use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::info;

use auris_model::{TaskId, TaskKind, TaskStatus, WorkCode};

use crate::error::{IngestError, Result};

/// Mutable task state, guarded by one lock.
#[derive(Debug, Clone)]
pub struct TaskState {
    pub status: TaskStatus,
    pub progress: u8,
    pub current_step: String,
    pub error_message: Option<String>,
    pub output_path: Option<PathBuf>,
    pub work: Option<WorkCode>,
    pub metadata: Option<auris_model::WorkMetadata>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A single ingest job owned by the engine.
///
/// Workers are the only mutators; everyone else observes through the
/// snapshot accessors. Pause is a latch the worker awaits at honour-points;
/// cancel is a flag observed at the same points.
#[derive(Debug)]
pub struct IngestTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub source_path: PathBuf,
    pub auto_classify: bool,
    /// Set when re-processing a source that already lives in the archived
    /// pool: bump the bookkeeping, do not move the file again.
    pub skip_archive: bool,
    pub created_at: DateTime<Utc>,

    state: Mutex<TaskState>,
    cancelled: AtomicBool,
    pause_tx: watch::Sender<bool>,
    pause_rx: watch::Receiver<bool>,
}

impl IngestTask {
    pub fn new(kind: TaskKind, source_path: PathBuf, auto_classify: bool) -> Arc<Self> {
        Self::with_options(kind, source_path, auto_classify, false)
    }

    pub fn with_options(
        kind: TaskKind,
        source_path: PathBuf,
        auto_classify: bool,
        skip_archive: bool,
    ) -> Arc<Self> {
        let (pause_tx, pause_rx) = watch::channel(false);
        Arc::new(Self {
            id: TaskId::new(),
            kind,
            source_path,
            auto_classify,
            skip_archive,
            created_at: Utc::now(),
            state: Mutex::new(TaskState {
                status: TaskStatus::Pending,
                progress: 0,
                current_step: "等待中".to_string(),
                error_message: None,
                output_path: None,
                work: None,
                metadata: None,
                started_at: None,
                completed_at: None,
            }),
            cancelled: AtomicBool::new(false),
            pause_tx,
            pause_rx,
        })
    }

    pub fn snapshot(&self) -> TaskState {
        self.state.lock().unwrap().clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().unwrap().status
    }

    pub fn work(&self) -> Option<WorkCode> {
        self.state.lock().unwrap().work.clone()
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.state.lock().unwrap().output_path.clone()
    }

    pub fn metadata(&self) -> Option<auris_model::WorkMetadata> {
        self.state.lock().unwrap().metadata.clone()
    }

    pub fn set_work(&self, work: WorkCode) {
        self.state.lock().unwrap().work = Some(work);
    }

    pub fn set_metadata(&self, metadata: auris_model::WorkMetadata) {
        self.state.lock().unwrap().metadata = Some(metadata);
    }

    pub fn set_output_path(&self, path: PathBuf) {
        self.state.lock().unwrap().output_path = Some(path);
    }

    pub fn start(&self) {
        let mut state = self.state.lock().unwrap();
        state.status = TaskStatus::Running;
        state.started_at = Some(Utc::now());
        state.current_step = "处理中".to_string();
    }

    pub fn complete(&self) {
        let mut state = self.state.lock().unwrap();
        state.status = TaskStatus::Completed;
        state.completed_at = Some(Utc::now());
        state.progress = 100;
        state.current_step = "完成".to_string();
    }

    /// Complete with an operator-facing message, used for the
    /// waiting-manual outcome of duplicate conflicts.
    pub fn complete_with_message(&self, message: &str) {
        let mut state = self.state.lock().unwrap();
        state.status = TaskStatus::Completed;
        state.completed_at = Some(Utc::now());
        state.progress = 100;
        state.current_step = message.to_string();
    }

    pub fn fail(&self, error: &str) {
        let mut state = self.state.lock().unwrap();
        state.status = TaskStatus::Failed;
        state.completed_at = Some(Utc::now());
        state.error_message = Some(error.to_string());
        state.current_step = format!("失败: {error}");
    }

    pub fn pause(&self) {
        self.state.lock().unwrap().status = TaskStatus::Paused;
        let _ = self.pause_tx.send(true);
    }

    pub fn resume(&self) {
        self.state.lock().unwrap().status = TaskStatus::Running;
        let _ = self.pause_tx.send(false);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Unblock a worker parked on the pause latch so it can observe the
        // cancel flag.
        let _ = self.pause_tx.send(false);
        let mut state = self.state.lock().unwrap();
        state.status = TaskStatus::Failed;
        state.error_message = Some("user cancel".to_string());
        state.completed_at = Some(Utc::now());
        state.current_step = "已取消".to_string();
        info!(task = %self.id, "task cancelled by user");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn update_progress(&self, progress: u8, step: &str) {
        let mut state = self.state.lock().unwrap();
        state.progress = progress.min(100);
        state.current_step = step.to_string();
        info!(task = %self.id, progress = state.progress, step, "progress");
    }

    pub fn update_status(&self, status: TaskStatus, message: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.status = status;
        if let Some(message) = message {
            state.current_step = message.to_string();
        }
        if status.is_terminal() {
            state.completed_at = Some(Utc::now());
        }
    }

    /// Honour-point: wait while paused, then abort if cancelled.
    ///
    /// Every stage calls this before anything that blocks or mutates the
    /// filesystem.
    pub async fn checkpoint(&self) -> Result<()> {
        let mut rx = self.pause_rx.clone();
        while *rx.borrow() {
            if self.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        if self.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        Ok(())
    }
}
