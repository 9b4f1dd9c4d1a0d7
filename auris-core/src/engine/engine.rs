use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tokio::sync::{Semaphore, mpsc};
use tracing::{error, info, warn};

use auris_model::{TaskId, TaskKind, TaskStatus, WorkCode};

use crate::error::{IngestError, Result};

use super::pipeline;
use super::services::Services;
use super::task::{IngestTask, TaskState};

/// Wire-shaped task submission.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSubmission {
    pub source_path: PathBuf,
    pub task_type: String,
    #[serde(default)]
    pub auto_classify: bool,
}

/// Mutable set of work codes currently owned by a worker.
///
/// Claiming is the serialization point: the second task targeting an
/// in-flight code never waits, it short-circuits into a pending conflict.
#[derive(Debug, Default)]
pub struct WorkRegistry {
    in_flight: Mutex<HashSet<WorkCode>>,
}

impl WorkRegistry {
    pub fn is_in_flight(&self, work: &WorkCode) -> bool {
        self.in_flight.lock().unwrap().contains(work)
    }

    /// Claim a work code. Returns false when it was already claimed.
    pub fn claim(&self, work: &WorkCode) -> bool {
        let claimed = self.in_flight.lock().unwrap().insert(work.clone());
        if claimed {
            info!(work = %work, "work code claimed");
        }
        claimed
    }

    pub fn release(&self, work: &WorkCode) {
        if self.in_flight.lock().unwrap().remove(work) {
            info!(work = %work, "work code released");
        }
    }
}

/// Shared task map, so workers and observers see one task store.
type TaskMap = Arc<Mutex<HashMap<TaskId, Arc<IngestTask>>>>;

/// Bounded-concurrency task dispatcher.
///
/// Tasks enter a FIFO queue; a single dispatcher loop launches one worker
/// per task, gated by a semaphore of `max_concurrent` permits. Tasks for a
/// work code already in flight short-circuit into a pending conflict
/// instead of waiting.
pub struct TaskEngine {
    services: Arc<Services>,
    tasks: TaskMap,
    registry: Arc<WorkRegistry>,
    queue_tx: mpsc::UnboundedSender<Arc<IngestTask>>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<Arc<IngestTask>>>>,
    permits: Arc<Semaphore>,
    dispatcher: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("tasks", &self.tasks.lock().unwrap().len())
            .finish()
    }
}

impl TaskEngine {
    pub fn new(services: Arc<Services>) -> Arc<Self> {
        let max_concurrent = services.config.current().processing.max_concurrent.max(1);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        Arc::new(Self {
            services,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            registry: Arc::new(WorkRegistry::default()),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            dispatcher: Mutex::new(None),
        })
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Start the dispatcher loop. Idempotent.
    pub fn start(&self) {
        let Some(mut queue_rx) = self.queue_rx.lock().unwrap().take() else {
            warn!("task engine already started");
            return;
        };

        let services = Arc::clone(&self.services);
        let registry = Arc::clone(&self.registry);
        let permits = Arc::clone(&self.permits);

        let handle = tokio::spawn(async move {
            info!("task engine dispatcher running");
            while let Some(task) = queue_rx.recv().await {
                let permit = match Arc::clone(&permits).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let services = Arc::clone(&services);
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    pipeline::run(services, registry, task).await;
                    drop(permit);
                });
            }
            info!("task engine dispatcher stopped");
        });

        *self.dispatcher.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.dispatcher.lock().unwrap().take() {
            handle.abort();
        }
        self.permits.close();
    }

    /// Enqueue a prepared task. Returns immediately.
    pub fn submit_task(&self, task: Arc<IngestTask>) -> TaskId {
        let id = task.id;
        self.tasks.lock().unwrap().insert(id, Arc::clone(&task));
        if self.queue_tx.send(task).is_err() {
            error!(task = %id, "queue closed, task will never run");
        }
        info!(task = %id, "task submitted");
        id
    }

    /// Enqueue from the wire contract: returns the id and the initial
    /// state snapshot.
    pub fn submit(&self, submission: TaskSubmission) -> Result<(TaskId, TaskState)> {
        let kind = TaskKind::from_wire(&submission.task_type).ok_or_else(|| {
            IngestError::Internal(format!("unknown task type: {}", submission.task_type))
        })?;

        // Sources already inside the archived pool are re-processing runs:
        // archival must refresh their row instead of moving them again.
        let pool = self
            .services
            .config
            .current()
            .storage
            .processed_archives_path
            .clone();
        let skip_archive = submission.source_path.starts_with(&pool);

        let task = IngestTask::with_options(
            kind,
            submission.source_path,
            submission.auto_classify,
            skip_archive,
        );
        let snapshot = task.snapshot();
        let id = self.submit_task(task);
        Ok((id, snapshot))
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<IngestTask>> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    /// Tasks filtered by status, newest first.
    pub fn list(&self, status: Option<TaskStatus>) -> Vec<Arc<IngestTask>> {
        let mut tasks: Vec<Arc<IngestTask>> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|task| status.is_none_or(|wanted| task.status() == wanted))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Is a pending or running task already bound to this source path?
    pub fn has_active_task_for(&self, source: &std::path::Path) -> bool {
        self.tasks.lock().unwrap().values().any(|task| {
            task.source_path == source
                && matches!(task.status(), TaskStatus::Pending | TaskStatus::Running)
        })
    }

    pub fn pause(&self, id: TaskId) -> Result<()> {
        self.with_task(id, |task| task.pause())
    }

    pub fn resume(&self, id: TaskId) -> Result<()> {
        self.with_task(id, |task| task.resume())
    }

    pub fn cancel(&self, id: TaskId) -> Result<()> {
        self.with_task(id, |task| task.cancel())
    }

    /// External status override, used by the conflict resolution handler.
    pub fn update_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        message: Option<&str>,
    ) -> Result<()> {
        self.with_task(id, |task| task.update_status(status, message))
    }

    fn with_task(&self, id: TaskId, apply: impl FnOnce(&IngestTask)) -> Result<()> {
        let task = self
            .get(id)
            .ok_or_else(|| IngestError::TaskNotFound(id.to_string()))?;
        apply(&task);
        Ok(())
    }

    /// True when another worker currently owns this work code.
    pub fn is_work_in_flight(&self, work: &WorkCode) -> bool {
        self.registry.is_in_flight(work)
    }

    /// Claim a work code. Returns false when it was already claimed.
    pub fn claim_work(&self, work: &WorkCode) -> bool {
        self.registry.claim(work)
    }

    pub fn release_work(&self, work: &WorkCode) {
        self.registry.release(work)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auris_config::{AppConfig, ConfigHandle};
    use crate::db::Database;

    async fn engine() -> Arc<TaskEngine> {
        let db = Database::open_in_memory().await.unwrap();
        let services = Services::build(db, ConfigHandle::new(AppConfig::default())).unwrap();
        TaskEngine::new(services)
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_kind() {
        let engine = engine().await;
        let result = engine.submit(TaskSubmission {
            source_path: PathBuf::from("/input/a.zip"),
            task_type: "transcode".to_string(),
            auto_classify: true,
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_submit_and_get() {
        let engine = engine().await;
        let (id, snapshot) = engine
            .submit(TaskSubmission {
                source_path: PathBuf::from("/input/RJ123456.zip"),
                task_type: "auto_process".to_string(),
                auto_classify: true,
            })
            .unwrap();

        assert_eq!(snapshot.status, TaskStatus::Pending);
        let task = engine.get(id).unwrap();
        assert_eq!(task.kind, TaskKind::AutoIngest);
        assert!(engine.has_active_task_for(std::path::Path::new("/input/RJ123456.zip")));
    }

    #[tokio::test]
    async fn test_list_sorted_and_filtered() {
        let engine = engine().await;
        for name in ["a.zip", "b.zip", "c.zip"] {
            engine
                .submit(TaskSubmission {
                    source_path: PathBuf::from(format!("/input/{name}")),
                    task_type: "extract".to_string(),
                    auto_classify: false,
                })
                .unwrap();
        }

        let all = engine.list(None);
        assert_eq!(all.len(), 3);
        // Newest first.
        assert!(all[0].created_at >= all[2].created_at);

        all[0].start();
        all[0].complete();
        assert_eq!(engine.list(Some(TaskStatus::Pending)).len(), 2);
        assert_eq!(engine.list(Some(TaskStatus::Completed)).len(), 1);
    }

    #[tokio::test]
    async fn test_work_claims_are_exclusive() {
        let engine = engine().await;
        let work = WorkCode::parse("RJ123456").unwrap();

        assert!(!engine.is_work_in_flight(&work));
        assert!(engine.claim_work(&work));
        assert!(!engine.claim_work(&work));
        assert!(engine.is_work_in_flight(&work));

        engine.release_work(&work);
        assert!(engine.claim_work(&work));
    }

    #[tokio::test]
    async fn test_unknown_task_operations_error() {
        let engine = engine().await;
        assert!(engine.pause(TaskId::new()).is_err());
        assert!(engine.cancel(TaskId::new()).is_err());
    }
}
