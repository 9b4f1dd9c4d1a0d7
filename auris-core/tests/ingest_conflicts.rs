//! End-to-end conflict behaviour of the task engine: duplicate pre-checks
//! short-circuit before extraction, conflicts are recorded exactly once,
//! and nothing leaks into the temp or processed trees.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use auris_config::{AppConfig, ConfigHandle};
use auris_core::db::Database;
use auris_core::engine::{Services, TaskEngine, TaskSubmission};
use auris_model::{ConflictKind, TaskStatus, WorkCode};

struct Fixture {
    _root: tempfile::TempDir,
    input: PathBuf,
    temp: PathBuf,
    library: PathBuf,
    processed: PathBuf,
    db: Database,
    engine: Arc<TaskEngine>,
}

async fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("input");
    let temp = root.path().join("temp");
    let library = root.path().join("library");
    let processed = root.path().join("processed");
    for dir in [&input, &temp, &library, &processed] {
        std::fs::create_dir_all(dir).unwrap();
    }

    let mut config = AppConfig::default();
    config.storage.input_path = input.clone();
    config.storage.temp_path = temp.clone();
    config.storage.library_path = library.clone();
    config.storage.processed_archives_path = processed.clone();

    let db = Database::open_in_memory().await.unwrap();
    let services = Services::build(db.clone(), ConfigHandle::new(config)).unwrap();
    let engine = TaskEngine::new(services);
    engine.start();

    Fixture {
        _root: root,
        input,
        temp,
        library,
        processed,
        db,
        engine,
    }
}

async fn wait_terminal(engine: &TaskEngine, id: auris_model::TaskId) -> TaskStatus {
    // Generous bound: the extraction path sleeps through real stability
    // intervals before it can fail.
    for _ in 0..3000 {
        let status = engine.get(id).unwrap().status();
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task never reached a terminal state");
}

fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn duplicate_precheck_quarantines_without_extracting() {
    let fx = fixture().await;

    // The work is already shelved.
    std::fs::create_dir_all(fx.library.join("RJ01234567 A")).unwrap();

    // Drop the same work as an archive. The file is not a real archive:
    // the pre-check must stop the task before the extractor ever runs.
    let archive = fx.input.join("RJ01234567.zip");
    std::fs::write(&archive, vec![0u8; 2048]).unwrap();

    let (id, _) = fx
        .engine
        .submit(TaskSubmission {
            source_path: archive.clone(),
            task_type: "auto_process".to_string(),
            auto_classify: true,
        })
        .unwrap();

    let status = wait_terminal(&fx.engine, id).await;
    assert_eq!(status, TaskStatus::Completed);
    assert!(
        fx.engine
            .get(id)
            .unwrap()
            .snapshot()
            .current_step
            .contains("waiting manual")
    );

    let work = WorkCode::parse("RJ01234567").unwrap();
    let conflict = fx
        .db
        .conflicts()
        .pending_for(&work)
        .await
        .unwrap()
        .expect("conflict must be recorded");
    assert_eq!(conflict.kind, ConflictKind::Duplicate);
    assert_eq!(conflict.new_path, archive.to_string_lossy());
    assert!(conflict.existing_path.ends_with("RJ01234567 A"));

    // The archive was not touched, temp stayed empty, nothing was
    // archived.
    assert!(archive.exists());
    assert_eq!(entry_count(&fx.temp), 0);
    assert_eq!(entry_count(&fx.processed), 0);
}

#[tokio::test]
async fn submitting_the_same_work_twice_records_one_conflict() {
    let fx = fixture().await;
    std::fs::create_dir_all(fx.library.join("RJ01234567 A")).unwrap();

    let archive = fx.input.join("RJ01234567.zip");
    std::fs::write(&archive, vec![0u8; 2048]).unwrap();

    let (first, _) = fx
        .engine
        .submit(TaskSubmission {
            source_path: archive.clone(),
            task_type: "auto_process".to_string(),
            auto_classify: true,
        })
        .unwrap();
    assert_eq!(wait_terminal(&fx.engine, first).await, TaskStatus::Completed);

    let (second, _) = fx
        .engine
        .submit(TaskSubmission {
            source_path: archive.clone(),
            task_type: "auto_process".to_string(),
            auto_classify: true,
        })
        .unwrap();
    assert_eq!(
        wait_terminal(&fx.engine, second).await,
        TaskStatus::Completed
    );

    let pending = fx.db.conflicts().list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn tasks_without_codes_skip_the_precheck() {
    let fx = fixture().await;

    // No work code in the name: the pre-check cannot apply and the task
    // proceeds to extraction, which fails on the fake archive.
    let archive = fx.input.join("mystery-drop.zip");
    std::fs::write(&archive, vec![0u8; 2048]).unwrap();

    let (id, _) = fx
        .engine
        .submit(TaskSubmission {
            source_path: archive,
            task_type: "auto_process".to_string(),
            auto_classify: true,
        })
        .unwrap();

    let status = wait_terminal(&fx.engine, id).await;
    assert_eq!(status, TaskStatus::Failed);
    assert!(fx.db.conflicts().list_pending().await.unwrap().is_empty());

    // Extraction failure must not leave partial output behind.
    assert_eq!(entry_count(&fx.temp), 0);
}

#[tokio::test]
async fn cancelled_queued_task_never_runs() {
    let fx = fixture().await;

    let archive = fx.input.join("RJ01234567.zip");
    std::fs::write(&archive, vec![0u8; 2048]).unwrap();

    let (id, _) = fx
        .engine
        .submit(TaskSubmission {
            source_path: archive,
            task_type: "auto_process".to_string(),
            auto_classify: true,
        })
        .unwrap();
    fx.engine.cancel(id).unwrap();

    let status = wait_terminal(&fx.engine, id).await;
    assert_eq!(status, TaskStatus::Failed);
    let task = fx.engine.get(id).unwrap();
    assert_eq!(
        task.snapshot().error_message.as_deref(),
        Some("user cancel")
    );
}
