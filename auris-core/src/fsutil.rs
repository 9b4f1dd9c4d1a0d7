//! Small filesystem helpers shared across pipeline stages.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::Result;

/// Total byte size and file count of a directory tree.
pub fn dir_stats(path: &Path) -> (i64, i64) {
    let mut size: i64 = 0;
    let mut count: i64 = 0;
    let mut stack = vec![path.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let entry_path = entry.path();
            if entry_path.is_dir() {
                stack.push(entry_path);
            } else if let Ok(meta) = entry.metadata() {
                size += meta.len() as i64;
                count += 1;
            }
        }
    }

    (size, count)
}

/// First non-existing variant of `target`, counting up through
/// `name(1).ext`, `name(2).ext`, ...
pub fn unique_path(target: &Path) -> PathBuf {
    if !target.exists() {
        return target.to_path_buf();
    }

    let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = target
        .extension()
        .map(|e| e.to_string_lossy().to_string());

    let mut counter = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{stem}({counter}).{ext}"),
            None => format!("{stem}({counter})"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn copy_dir_all(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir_all(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Rename with copy-and-delete fallback for cross-device moves.
pub fn move_path(source: &Path, target: &Path) -> std::io::Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(_) => {
            if source.is_dir() {
                copy_dir_all(source, target)?;
                fs::remove_dir_all(source)
            } else {
                fs::copy(source, target)?;
                fs::remove_file(source)
            }
        }
    }
}

/// Move `source` into `target_dir`, keeping its basename and resolving a
/// name collision with a `(N)` suffix. Returns the final path.
pub fn move_into(source: &Path, target_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(target_dir)?;

    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let target = unique_path(&target_dir.join(name));

    move_path(source, &target)?;
    info!(from = %source.display(), to = %target.display(), "moved");
    Ok(target)
}

/// Delete a file or directory tree, whichever `path` is.
pub fn remove_any(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Delete a directory tree with a few retries, for trees the archive tool
/// or a virus scanner may still be holding open.
pub async fn remove_dir_with_retries(path: &Path, attempts: u32, delay: Duration) {
    if !path.exists() {
        return;
    }

    for attempt in 1..=attempts {
        match fs::remove_dir_all(path) {
            Ok(()) => {
                info!(path = %path.display(), "removed directory");
                return;
            }
            Err(err) if attempt < attempts => {
                warn!(
                    path = %path.display(),
                    attempt,
                    "remove failed, retrying: {err}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                warn!(path = %path.display(), "giving up removing directory: {err}");
            }
        }
    }
}
