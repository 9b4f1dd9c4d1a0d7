use std::io::Read;
use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::task::IngestTask;
use crate::error::{IngestError, Result};

/// Files below this size are treated as still mid-copy.
pub const MIN_STABLE_SIZE: u64 = 1024;

fn probe_readable(path: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut byte = [0u8; 1];
    file.read(&mut byte).is_ok()
}

/// Wait until the file's size holds steady for `checks` consecutive
/// readings taken `interval` seconds apart.
///
/// The file must also be openable for read; a locked file resets the
/// stable counter. Honours the task's pause latch and cancel flag on every
/// iteration.
pub async fn wait_stable(
    path: &Path,
    task: &IngestTask,
    checks: u32,
    interval: Duration,
    max_wait: Duration,
) -> Result<()> {
    let started = Instant::now();
    let mut previous_size: Option<u64> = None;
    let mut stable_count: u32 = 0;
    let mut last_progress = started;

    info!(path = %path.display(), "waiting for file copy to finish");

    loop {
        if started.elapsed() > max_wait {
            return Err(IngestError::StabilityTimeout(path.to_path_buf()));
        }

        task.checkpoint().await?;

        let Ok(meta) = std::fs::metadata(path) else {
            tokio::time::sleep(interval).await;
            continue;
        };
        let current_size = meta.len();

        if current_size < MIN_STABLE_SIZE {
            debug!(path = %path.display(), current_size, "file too small, still copying");
            stable_count = 0;
            previous_size = Some(current_size);
            tokio::time::sleep(interval).await;
            continue;
        }

        if previous_size == Some(current_size) {
            if probe_readable(path) {
                stable_count += 1;
                if stable_count >= checks {
                    info!(
                        path = %path.display(),
                        size = current_size,
                        "file stabilised"
                    );
                    return Ok(());
                }
            } else {
                debug!(path = %path.display(), "file still locked, resetting counter");
                stable_count = 0;
            }
        } else {
            if stable_count > 0 {
                info!(path = %path.display(), size = current_size, "file still growing");
            }
            stable_count = 0;
            last_progress = Instant::now();
        }

        previous_size = Some(current_size);

        if last_progress.elapsed() > Duration::from_secs(60) {
            warn!(path = %path.display(), size = current_size, "copy appears stalled");
            last_progress = Instant::now();
        }

        tokio::time::sleep(interval).await;
    }
}

/// One-shot stability sample: equal size across a two-second gap.
pub async fn is_stable_quick(path: &Path) -> bool {
    let Ok(first) = std::fs::metadata(path) else {
        return false;
    };
    tokio::time::sleep(Duration::from_secs(2)).await;
    let Ok(second) = std::fs::metadata(path) else {
        return false;
    };
    first.len() == second.len()
}
